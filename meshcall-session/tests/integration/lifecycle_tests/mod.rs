pub mod test_channel_lost_reports_error;
pub mod test_connection_failure_tears_down_once;
