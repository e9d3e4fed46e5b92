use tether_core::domain::Timestamp;

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    /// Human output without informational detail lines (`-q`)
    Quiet,
    Json,
}

impl OutputFormat {
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        match (json, quiet) {
            (true, _) => OutputFormat::Json,
            (false, true) => OutputFormat::Quiet,
            (false, false) => OutputFormat::Human,
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

/// Sink for command results
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn print_json(&self, value: &serde_json::Value);
}

/// Terminal output; results on stdout, problems on stderr
pub struct HumanFormatter {
    details: bool,
}

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {message}");
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {message}");
    }
    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {message}");
    }
    fn info(&self, message: &str) {
        if self.details {
            println!("  {message}");
        }
    }
    fn print_json(&self, _value: &serde_json::Value) {}
}

/// Machine-readable output; commands emit one document via `print_json`
pub struct JsonFormatter;

impl JsonFormatter {
    fn line(value: serde_json::Value) -> String {
        serde_json::to_string(&value).unwrap_or_default()
    }
}

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!("{}", Self::line(serde_json::json!({"success": true, "message": message})));
    }
    fn error(&self, message: &str) {
        eprintln!("{}", Self::line(serde_json::json!({"success": false, "error": message})));
    }
    fn warn(&self, message: &str) {
        eprintln!("{}", Self::line(serde_json::json!({"level": "warning", "message": message})));
    }
    fn info(&self, _message: &str) {}
    fn print_json(&self, value: &serde_json::Value) {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Human => Box::new(HumanFormatter { details: true }),
        OutputFormat::Quiet => Box::new(HumanFormatter { details: false }),
    }
}

/// "1 change", "3 changes"
pub fn plural(count: u64, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// Milliseconds as "850ms" or "2.4s"
pub fn format_duration_ms(ms: u64) -> String {
    if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{ms}ms")
    }
}

/// Wall-clock rendering of a timestamp; "never" for the epoch
pub fn format_timestamp(ts: Timestamp) -> String {
    if ts == Timestamp::EPOCH {
        return "never".to_string();
    }
    ts.to_datetime()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}
