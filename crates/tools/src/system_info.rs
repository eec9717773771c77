use async_trait::async_trait;
use clawbot_core::Result;
use serde_json::{json, Value};

use crate::{Tool, ToolContext, ToolSchema};

/// Tool: system_info. Reports host OS, CPU, memory, disk and uptime figures
/// so the agent can answer "how is this machine doing" without shelling out.
pub struct SystemInfoTool;

#[async_trait]
impl Tool for SystemInfoTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "system_info",
            description: "Report system status: OS, CPU cores, load, memory, disk and uptime",
            parameters: json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, _ctx: ToolContext, _params: Value) -> Result<Value> {
        let mut info = json!({
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "cpu_cores": std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        });

        if let Some(load) = read_loadavg().await {
            info["load_average"] = json!(load);
        }
        if let Some((total_kb, available_kb)) = read_meminfo().await {
            info["memory_total_mb"] = json!(total_kb / 1024);
            info["memory_available_mb"] = json!(available_kb / 1024);
            if total_kb > 0 {
                let used_pct = 100.0 * (total_kb - available_kb) as f64 / total_kb as f64;
                info["memory_percent"] = json!(format!("{:.1}", used_pct));
            }
        }
        if let Some(uptime) = read_uptime().await {
            info["uptime"] = json!(uptime);
        }
        if let Some(disk) = disk_usage().await {
            info["disk"] = json!(disk);
        }

        Ok(info)
    }
}

/// Linux /proc/loadavg, first three fields.
async fn read_loadavg() -> Option<String> {
    let content = tokio::fs::read_to_string("/proc/loadavg").await.ok()?;
    let fields: Vec<&str> = content.split_whitespace().take(3).collect();
    if fields.len() == 3 {
        Some(fields.join(" "))
    } else {
        None
    }
}

/// Linux /proc/meminfo: (MemTotal, MemAvailable) in kB.
async fn read_meminfo() -> Option<(u64, u64)> {
    let content = tokio::fs::read_to_string("/proc/meminfo").await.ok()?;
    let mut total = None;
    let mut available = None;
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total = rest.trim().split_whitespace().next()?.parse().ok();
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available = rest.trim().split_whitespace().next()?.parse().ok();
        }
    }
    Some((total?, available?))
}

/// Linux /proc/uptime rendered as days/hours/minutes.
async fn read_uptime() -> Option<String> {
    let content = tokio::fs::read_to_string("/proc/uptime").await.ok()?;
    let secs: f64 = content.split_whitespace().next()?.parse().ok()?;
    Some(format_uptime(secs as u64))
}

fn format_uptime(total_secs: u64) -> String {
    let days = total_secs / 86400;
    let hours = (total_secs % 86400) / 3600;
    let minutes = (total_secs % 3600) / 60;
    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

/// Root filesystem usage via `df -h /` (first data row).
async fn disk_usage() -> Option<String> {
    let output = tokio::process::Command::new("df")
        .args(["-h", "/"])
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    text.lines().nth(1).map(|l| l.trim().to_string())
}
