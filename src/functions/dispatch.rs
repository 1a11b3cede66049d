//! Buffering and dispatch of streamed function calls.
//!
//! Argument text arrives as deltas keyed by call id and is resolved when the
//! matching done event or the response payload closes the call. Everything in
//! here is forgiving: unknown functions, argument mismatches and individual
//! parameter failures are logged and skipped, never fatal to the turn.

use std::collections::HashMap;

use crate::errors::DataError;
use crate::events::{FunctionEvent, FunctionSink};
use crate::functions::{FunctionRegistry, coerce};
use crate::protocol::messages::ConversationItem;

/// Accumulated argument text for in-flight streamed calls.
///
/// Entries never survive a turn: they are consumed when the call completes
/// and any leftovers are swept when the owning response finishes.
#[derive(Debug, Default)]
pub struct FunctionCallBuffer {
    entries: HashMap<String, String>,
}

impl FunctionCallBuffer {
    /// Append an argument delta for a call id.
    pub fn append(&mut self, call_id: &str, delta: &str) {
        self.entries
            .entry(call_id.to_string())
            .or_default()
            .push_str(delta);
    }

    /// Resolve the final argument text for a call.
    ///
    /// Buffered delta text wins over the final-payload value; a mismatch is
    /// logged but not treated as an error.
    pub fn resolve(&mut self, call_id: &str, final_args: Option<&str>) -> String {
        match (self.entries.remove(call_id), final_args) {
            (Some(buffered), Some(final_text)) => {
                if buffered != final_text {
                    tracing::warn!(
                        call_id,
                        buffered_len = buffered.len(),
                        final_len = final_text.len(),
                        "buffered function arguments differ from final payload, using buffered"
                    );
                }
                buffered
            }
            (Some(buffered), None) => buffered,
            (None, Some(final_text)) => final_text.to_string(),
            (None, None) => String::new(),
        }
    }

    /// Close a streamed call: resolve it against the final text and keep the
    /// result buffered for the owning response's completion pass.
    pub fn settle(&mut self, call_id: &str, final_args: &str) {
        let resolved = self.resolve(call_id, Some(final_args));
        self.entries.insert(call_id.to_string(), resolved);
    }

    /// Drop every remaining entry, logging each as stale.
    pub fn sweep(&mut self) {
        for (call_id, text) in self.entries.drain() {
            tracing::warn!(call_id, len = text.len(), "sweeping stale function call buffer entry");
        }
    }

    /// Drop everything without logging. Used on communication-state resets.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Whether any in-flight call still has buffered text.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of in-flight calls with buffered text.
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A vision sub-request extracted from the reserved function call.
#[derive(Debug, Clone, PartialEq)]
pub enum VisionCall {
    /// The reserved call carried a usable prompt
    Requested(String),
    /// The reserved call had a missing or blank prompt
    MissingPrompt,
}

/// Process every function-call item in a completed response payload.
///
/// The reserved identifier is routed back to the caller as a [`VisionCall`];
/// all other identifiers are resolved against the registry, firing the
/// zero-argument [`FunctionEvent::Invoked`] followed by one
/// [`FunctionEvent::Parameter`] per successfully coerced declared parameter.
/// Leftover buffer entries are swept afterwards.
pub fn process_response_calls(
    items: &[ConversationItem],
    buffer: &mut FunctionCallBuffer,
    registry: &FunctionRegistry,
    reserved_vision_name: &str,
    sink: &FunctionSink,
) -> Vec<VisionCall> {
    let mut vision_calls = Vec::new();

    for item in items.iter().filter(|i| i.item_type == "function_call") {
        let Some(name) = item.name.as_deref() else {
            tracing::warn!("function call item without a name, skipping");
            continue;
        };
        let call_id = item.call_id.as_deref().unwrap_or_default();
        let arguments = buffer.resolve(call_id, item.arguments.as_deref());

        if name == reserved_vision_name {
            vision_calls.push(extract_vision_prompt(&arguments));
            continue;
        }

        let Some(def) = registry.lookup(name) else {
            tracing::warn!(function = name, "assistant called an undeclared function, ignoring");
            continue;
        };

        sink(FunctionEvent::Invoked {
            name: def.name.clone(),
        });

        if arguments.is_empty() || def.parameters.is_empty() {
            continue;
        }

        let parsed: serde_json::Value = match serde_json::from_str(&arguments) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(
                    function = name,
                    error = %DataError::MalformedJson(e.to_string()),
                    raw = arguments,
                    "function arguments are not valid JSON, skipping parameters"
                );
                continue;
            }
        };
        let Some(object) = parsed.as_object() else {
            tracing::warn!(function = name, "function arguments are not a JSON object");
            continue;
        };

        for param in &def.parameters {
            // Argument keys match declared names case-insensitively
            let Some((_, raw)) = object
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(&param.name))
            else {
                continue;
            };

            match coerce::coerce(&param.kind, raw) {
                Ok(value) => sink(FunctionEvent::Parameter {
                    function: def.name.clone(),
                    name: param.name.clone(),
                    value,
                }),
                Err(e) => {
                    tracing::warn!(
                        function = name,
                        parameter = param.name,
                        error = %e,
                        "parameter coercion failed, skipping"
                    );
                }
            }
        }
    }

    buffer.sweep();
    vision_calls
}

/// Pull the prompt string out of the reserved call's arguments.
fn extract_vision_prompt(arguments: &str) -> VisionCall {
    let parsed: serde_json::Value = match serde_json::from_str(arguments) {
        Ok(v) => v,
        Err(_) => return VisionCall::MissingPrompt,
    };
    let prompt = parsed
        .as_object()
        .and_then(|o| o.iter().find(|(k, _)| k.eq_ignore_ascii_case("prompt")))
        .and_then(|(_, v)| v.as_str())
        .map(str::trim)
        .unwrap_or_default();

    if prompt.is_empty() {
        VisionCall::MissingPrompt
    } else {
        VisionCall::Requested(prompt.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::null_function_sink;
    use crate::functions::{
        FunctionDefinition, ParameterKind, ParameterSpec, ParameterValue,
    };
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn call_item(name: &str, call_id: &str, args: Option<&str>) -> ConversationItem {
        ConversationItem {
            id: None,
            item_type: "function_call".to_string(),
            role: None,
            content: None,
            call_id: Some(call_id.to_string()),
            name: Some(name.to_string()),
            arguments: args.map(str::to_string),
            output: None,
        }
    }

    fn registry() -> FunctionRegistry {
        FunctionRegistry::new(vec![FunctionDefinition {
            name: "set_door".to_string(),
            description: String::new(),
            parameters: vec![ParameterSpec {
                name: "state".to_string(),
                kind: ParameterKind::Enum {
                    values: vec!["Closed".to_string(), "Open".to_string()],
                },
            }],
        }])
    }

    fn collecting_sink() -> (FunctionSink, Arc<Mutex<Vec<FunctionEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink: FunctionSink = Arc::new(move |e| sink_seen.lock().push(e));
        (sink, seen)
    }

    #[test]
    fn test_buffer_prefers_deltas_over_final_payload() {
        let mut buffer = FunctionCallBuffer::default();
        buffer.append("call_1", "{\"state\":");
        buffer.append("call_1", "\"Open\"}");
        let resolved = buffer.resolve("call_1", Some("{\"state\":\"Closed\"}"));
        assert_eq!(resolved, "{\"state\":\"Open\"}");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_settled_call_survives_until_response_pass() {
        let mut buffer = FunctionCallBuffer::default();
        buffer.append("call_1", "{\"state\":\"Open\"}");
        buffer.settle("call_1", "{\"state\":\"Open\"}");
        // The response payload carries no arguments; the settled text wins
        let resolved = buffer.resolve("call_1", None);
        assert_eq!(resolved, "{\"state\":\"Open\"}");
    }

    #[test]
    fn test_buffer_falls_back_to_final_payload() {
        let mut buffer = FunctionCallBuffer::default();
        let resolved = buffer.resolve("call_2", Some("{\"x\":1}"));
        assert_eq!(resolved, "{\"x\":1}");
    }

    #[test]
    fn test_enum_parameter_emits_index_and_name() {
        let mut buffer = FunctionCallBuffer::default();
        let (sink, seen) = collecting_sink();
        let items = vec![call_item("set_door", "c1", Some("{\"state\":\"Open\"}"))];

        let vision =
            process_response_calls(&items, &mut buffer, &registry(), "request_view", &sink);
        assert!(vision.is_empty());

        let events = seen.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            FunctionEvent::Invoked {
                name: "set_door".to_string()
            }
        );
        assert_eq!(
            events[1],
            FunctionEvent::Parameter {
                function: "set_door".to_string(),
                name: "state".to_string(),
                value: ParameterValue::Enum {
                    index: 1,
                    name: "Open".to_string()
                },
            }
        );
    }

    #[test]
    fn test_case_insensitive_argument_keys() {
        let mut buffer = FunctionCallBuffer::default();
        let (sink, seen) = collecting_sink();
        let items = vec![call_item("set_door", "c1", Some("{\"State\":\"closed\"}"))];
        process_response_calls(&items, &mut buffer, &registry(), "request_view", &sink);

        let events = seen.lock();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[1],
            FunctionEvent::Parameter {
                value: ParameterValue::Enum { index: 0, .. },
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_function_is_ignored() {
        let mut buffer = FunctionCallBuffer::default();
        let (sink, seen) = collecting_sink();
        let items = vec![call_item("launch_rocket", "c9", Some("{}"))];
        process_response_calls(&items, &mut buffer, &registry(), "request_view", &sink);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_bad_parameter_skipped_call_still_fires() {
        let mut buffer = FunctionCallBuffer::default();
        let (sink, seen) = collecting_sink();
        let items = vec![call_item("set_door", "c1", Some("{\"state\":\"Ajar\"}"))];
        process_response_calls(&items, &mut buffer, &registry(), "request_view", &sink);

        let events = seen.lock();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], FunctionEvent::Invoked { .. }));
    }

    #[test]
    fn test_vision_call_routed_and_prompt_extracted() {
        let mut buffer = FunctionCallBuffer::default();
        let sink = null_function_sink();
        let items = vec![
            call_item("request_view", "c1", Some("{\"prompt\":\"what is ahead?\"}")),
            call_item("request_view", "c2", Some("{\"prompt\":\"  \"}")),
        ];
        let vision =
            process_response_calls(&items, &mut buffer, &registry(), "request_view", &sink);
        assert_eq!(
            vision,
            vec![
                VisionCall::Requested("what is ahead?".to_string()),
                VisionCall::MissingPrompt,
            ]
        );
    }

    #[test]
    fn test_stale_entries_swept_after_processing() {
        let mut buffer = FunctionCallBuffer::default();
        buffer.append("orphan", "{\"x\":");
        let sink = null_function_sink();
        process_response_calls(&[], &mut buffer, &registry(), "request_view", &sink);
        assert!(buffer.is_empty());
    }
}
