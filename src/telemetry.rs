//! Telemetry sink: purely observational hooks into the tick engine.
//!
//! Determinism forbids any logging path that could perturb
//! engine behavior or depend on non-reproducible formatting, so telemetry
//! is one-way: the engine calls into a sink, the sink never feeds anything
//! back into `TickResult`. [`JsonLinesTelemetrySink`] hand-formats JSON
//! lines to a caller-supplied `Write`, avoiding `serde_json` for the same
//! reason the prior incarnation of this crate avoided it for its own
//! telemetry sink.

use std::io::Write;

/// Observes engine lifecycle events without influencing them. Implementors
/// must not block or panic; I/O failures should be swallowed.
pub trait TelemetrySink: Send + Sync {
    /// Called once at the start of each tick, before any phase runs.
    fn tick_start(&mut self, tick: u64);

    /// Called once at the end of each tick, after aggregation.
    fn tick_end(&mut self, tick: u64, event_count: usize, wealth_total: u64);

    /// Called when a tick aborts on a core invariant violation.
    fn invariant_violation(&mut self, tick: u64, which: &str);

    /// Called when the canonical-state cache is invalidated.
    fn cache_invalidated(&mut self, reason: &str);

    /// Called when a policy slot fails to compile.
    fn policy_compile_error(&mut self, slot: &str, message: &str);
}

/// A sink that discards every event. The engine's default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTelemetrySink;

impl TelemetrySink for NullTelemetrySink {
    fn tick_start(&mut self, _tick: u64) {}
    fn tick_end(&mut self, _tick: u64, _event_count: usize, _wealth_total: u64) {}
    fn invariant_violation(&mut self, _tick: u64, _which: &str) {}
    fn cache_invalidated(&mut self, _reason: &str) {}
    fn policy_compile_error(&mut self, _slot: &str, _message: &str) {}
}

/// Hand-formats one JSON object per line to `writer`, with no `serde_json`
/// dependency and no wall-clock timestamp (a timestamp would make output
/// non-reproducible across runs of the same seed; callers that want one
/// should derive it from their own run metadata instead).
pub struct JsonLinesTelemetrySink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesTelemetrySink<W> {
    /// Builds a sink writing JSON lines to `writer`.
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    fn emit(&mut self, line: &str) {
        let _ = writeln!(self.writer, "{line}");
    }
}

impl<W: Write + Send + Sync> TelemetrySink for JsonLinesTelemetrySink<W> {
    fn tick_start(&mut self, tick: u64) {
        self.emit(&format!(r#"{{"event":"tick_start","tick":{tick}}}"#));
    }

    fn tick_end(&mut self, tick: u64, event_count: usize, wealth_total: u64) {
        self.emit(&format!(
                r#"{{"event":"tick_end","tick":{tick},"event_count":{event_count},"wealth_total":{wealth_total}}}"#
        ));
    }

    fn invariant_violation(&mut self, tick: u64, which: &str) {
        let escaped = which.replace('\\', "\\\\").replace('"', "\\\"");
        self.emit(&format!(
                r#"{{"event":"invariant_violation","tick":{tick},"which":"{escaped}"}}"#
        ));
    }

    fn cache_invalidated(&mut self, reason: &str) {
        let escaped = reason.replace('\\', "\\\\").replace('"', "\\\"");
        self.emit(&format!(r#"{{"event":"cache_invalidated","reason":"{escaped}"}}"#));
    }

    fn policy_compile_error(&mut self, slot: &str, message: &str) {
        let escaped = message.replace('\\', "\\\\").replace('"', "\\\"");
        self.emit(&format!(
                r#"{{"event":"policy_compile_error","slot":"{slot}","message":"{escaped}"}}"#
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sink_accepts_every_call() {
        let mut sink = NullTelemetrySink;
        sink.tick_start(0);
        sink.tick_end(0, 3, 100);
        sink.invariant_violation(0, "test");
        sink.cache_invalidated("config changed");
        sink.policy_compile_error("raid_value", "parse error");
    }

    #[test]
    fn json_lines_sink_emits_one_line_per_call() {
        let mut buf = Vec::new();
        {
            let mut sink = JsonLinesTelemetrySink::new(&mut buf);
            sink.tick_start(5);
            sink.tick_end(5, 2, 900);
        }
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(r#""event":"tick_start""#));
        assert!(lines[1].contains(r#""wealth_total":900"#));
    }

    #[test]
    fn json_lines_sink_escapes_quotes_in_messages() {
        let mut buf = Vec::new();
        {
            let mut sink = JsonLinesTelemetrySink::new(&mut buf);
            sink.invariant_violation(1, r#"agent "K-01" missing"#);
        }
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains(r#"\"K-01\""#));
    }
}
