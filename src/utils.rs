use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Generate a random identifier for ICMP packets
pub fn generate_identifier() -> u16 {
    use rand::Rng;
    rand::thread_rng().gen_range(1..=65535)
}

/// Shared stop flag between the signal listener and a running session.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early on cancellation. Returns false if cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            std::thread::sleep(remaining.min(Duration::from_millis(50)));
        }
    }
}

/// Print error message and exit with error code
pub fn exit_with_error(message: &str, code: i32) -> ! {
    eprintln!("icmpkit: {}", message);
    process::exit(code);
}

pub fn validate_ping_params(size: u32, count: Option<u32>, timeout: u32) -> anyhow::Result<()> {
    if size > 65500 {
        return Err(anyhow::anyhow!("packet size too large, maximum is 65500 bytes"));
    }

    if count == Some(0) {
        return Err(anyhow::anyhow!("count must be greater than 0"));
    }

    if timeout == 0 {
        return Err(anyhow::anyhow!("timeout must be greater than 0"));
    }

    Ok(())
}

pub fn validate_trace_params(max_hops: u32, timeout: u32, size: u32) -> anyhow::Result<()> {
    if max_hops == 0 || max_hops > 255 {
        return Err(anyhow::anyhow!("maximum hops must be in the range 1-255"));
    }

    if timeout == 0 {
        return Err(anyhow::anyhow!("timeout must be greater than 0"));
    }

    if size > 65500 {
        return Err(anyhow::anyhow!("packet size too large, maximum is 65500 bytes"));
    }

    Ok(())
}

/// Format time duration for display
pub fn format_time(ms: f64) -> String {
    if ms < 1.0 {
        "<1ms".to_string()
    } else {
        format!("{:.0}ms", ms)
    }
}

/// Cancel `token` on the first Ctrl+C.
pub fn setup_signal_handler(token: CancelToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::debug!("Ctrl+C received, stopping");
                token.cancel();
            }
            Err(e) => log::warn!("Failed to listen for Ctrl+C: {}", e),
        }
    });
}
