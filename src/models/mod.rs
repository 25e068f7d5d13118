pub mod cochange;
pub mod commit;
pub mod graph;
pub mod record;
pub mod request;
pub mod risk;
pub mod search;
