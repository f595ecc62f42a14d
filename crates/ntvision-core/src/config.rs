use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub base_url: String,
    pub refresh_interval: Duration,
    pub retry_delay: Duration,
    pub max_attempts: u32,
    pub request_timeout: Duration,
    pub counter_tick: Duration,
    pub counter_divisor: u64,
    pub toast_ttl: Duration,
    pub toast_capacity: usize,
    pub activity_limit: usize,
    pub visibility_refresh_delay: Duration,
    pub auto_refresh: bool,
    /// Camera shown in the main viewer at startup. Falls back to the first
    /// camera of the set when unknown.
    pub default_camera: Option<String>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            refresh_interval: Duration::from_secs(5),
            retry_delay: Duration::from_secs(2),
            max_attempts: 3,
            request_timeout: Duration::from_secs(10),
            counter_tick: Duration::from_millis(50),
            counter_divisor: 20,
            toast_ttl: Duration::from_secs(5),
            toast_capacity: 5,
            activity_limit: 5,
            visibility_refresh_delay: Duration::from_secs(1),
            auto_refresh: true,
            default_camera: None,
        }
    }
}
