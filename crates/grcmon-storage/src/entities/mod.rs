pub mod alert;
pub mod alert_delivery;
pub mod alert_rule;
pub mod test_result;
pub mod test_run;
