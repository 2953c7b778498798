use serde::Serialize;

/// Host description included in every payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemInfo {
    /// e.g. "Ubuntu 24.04", "Windows 10.0.22631".
    pub os: String,
    pub hostname: String,
    /// Lowercase platform family: "linux", "windows", "macos", "android".
    pub platform: String,
}

impl SystemInfo {
    pub fn collect() -> Self {
        let info = os_info::get();
        let os = match info.version() {
            os_info::Version::Unknown => info.os_type().to_string(),
            version => format!("{} {}", info.os_type(), version),
        };

        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            os,
            hostname,
            platform: std::env::consts::OS.to_string(),
        }
    }
}
