//! JSON result envelopes
//!
//! Every command answers on stdout with one JSON document. Failures carry a
//! stable machine-readable `error` kind next to the human-readable message,
//! so scripted callers can branch without string matching.

use chatgate_core::GateError;
use serde::Serialize;
use serde_json::json;

use crate::error::Result;

/// Print a successful result envelope
pub fn ok<T: Serialize>(value: &T) -> Result<()> {
    let body = json!({
        "ok": true,
        "result": value,
    });
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

/// Print a failure envelope for a gateway error
pub fn gate_error(err: &GateError) {
    let body = json!({
        "ok": false,
        "error": err.kind(),
        "message": err.to_string(),
    });
    // Envelope construction cannot fail for these literals.
    println!("{}", body);
}

/// Print a failure envelope for an input/usage problem
pub fn usage_error(message: &str) {
    let body = json!({
        "ok": false,
        "error": "usage",
        "message": message,
    });
    println!("{}", body);
}

/// Print a failure envelope for a local file problem
pub fn io_error(context: &str, err: &std::io::Error) {
    let body = json!({
        "ok": false,
        "error": "io",
        "message": format!("{}: {}", context, err),
    });
    println!("{}", body);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_error_envelope_kind_is_stable() {
        let err = GateError::not_found("s1");
        assert_eq!(err.kind(), "not-found");
        // Rendering must not panic.
        gate_error(&err);
    }
}
