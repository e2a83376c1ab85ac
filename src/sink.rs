//! Outward-facing notifications: status text, diagnostics, geometry.

use heat_common::DiagnosticSample;
use log::info;

/// Where the driver publishes what the user should see.
pub trait UiSink {
    /// Status or error text, shown verbatim.
    fn publish_message(&mut self, message: &str);

    fn publish_diagnostic(&mut self, value: f64, simulated_time: f64);

    fn publish_geometry(&mut self, width: u32, height: u32);
}

/// Writes everything to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl UiSink for LogSink {
    fn publish_message(&mut self, message: &str) {
        info!("{}", message);
    }

    fn publish_diagnostic(&mut self, value: f64, simulated_time: f64) {
        info!("total energy: {} | time: {:.6}", value, simulated_time);
    }

    fn publish_geometry(&mut self, width: u32, height: u32) {
        info!("grid shape: {}x{}", width, height);
    }
}

/// Keeps every publication, and logs it through [`LogSink`].
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub messages: Vec<String>,
    pub diagnostics: Vec<DiagnosticSample>,
    /// Shape labels such as `"10x20"`.
    pub geometry: Vec<String>,
}

impl RecordingSink {
    pub fn last_message(&self) -> Option<&str> {
        self.messages.last().map(String::as_str)
    }
}

impl UiSink for RecordingSink {
    fn publish_message(&mut self, message: &str) {
        LogSink.publish_message(message);
        self.messages.push(message.to_string());
    }

    fn publish_diagnostic(&mut self, value: f64, simulated_time: f64) {
        LogSink.publish_diagnostic(value, simulated_time);
        self.diagnostics.push(DiagnosticSample { simulated_time, value });
    }

    fn publish_geometry(&mut self, width: u32, height: u32) {
        LogSink.publish_geometry(width, height);
        self.geometry.push(format!("{}x{}", width, height));
    }
}
