//! Command routing from host envelopes to the brain.

use crate::brain::Brain;
use crate::error::Result;
use crate::host::contract::{CommandEnvelope, CommandName, EVENT_VERSION, ResponseEnvelope};

/// Route a command and turn any failure into an error response.
#[must_use]
pub fn dispatch(brain: &Brain, envelope: &CommandEnvelope) -> ResponseEnvelope {
    route(brain, envelope).unwrap_or_else(|e| {
        tracing::warn!(
            request_id = %envelope.request_id,
            command = envelope.command.as_str(),
            error = %e,
            "host command failed"
        );
        ResponseEnvelope::error(envelope.request_id.clone(), e.to_string())
    })
}

/// Route a command envelope to the brain.
///
/// `ability.on`/`ability.off` only acknowledge the request; the resulting
/// lifecycle events arrive on the event stream.
pub fn route(brain: &Brain, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
    envelope.validate()?;
    let request_id = envelope.request_id.clone();

    match envelope.command {
        CommandName::HostPing => Ok(ResponseEnvelope::ok(
            request_id,
            serde_json::json!({"pong": true}),
        )),
        CommandName::HostVersion => Ok(ResponseEnvelope::ok(
            request_id,
            serde_json::json!({
                "contract_version": EVENT_VERSION,
                "version": env!("CARGO_PKG_VERSION"),
            }),
        )),
        CommandName::AbilityList => Ok(ResponseEnvelope::ok(
            request_id,
            serde_json::json!({ "abilities": brain.abilities() }),
        )),
        CommandName::AbilityOn => {
            let name = envelope.ability_name()?;
            brain.on(name)?;
            Ok(ResponseEnvelope::ok(
                request_id,
                serde_json::json!({"accepted": true, "name": name}),
            ))
        }
        CommandName::AbilityOff => {
            let name = envelope.ability_name()?;
            brain.off(name)?;
            Ok(ResponseEnvelope::ok(
                request_id,
                serde_json::json!({"accepted": true, "name": name}),
            ))
        }
        CommandName::AbilityStatus => {
            let status = brain.status(envelope.ability_name()?)?;
            Ok(ResponseEnvelope::ok(request_id, serde_json::to_value(status)?))
        }
        CommandName::RuntimeStop => {
            brain.off_all();
            Ok(ResponseEnvelope::ok(
                request_id,
                serde_json::json!({"accepted": true}),
            ))
        }
    }
}
