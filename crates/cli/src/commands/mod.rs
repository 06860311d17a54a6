pub mod anomalies;
pub mod shares;
