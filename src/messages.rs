use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// `%%N` parameter references resolve through the resolver; `%N` and the
/// `%n`/`%t`/`%r` control tokens substitute from the flattened event data.
static EXPANSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%%(\d+)|%[0-9ntr]+").expect("valid regex"));

static PARAMETER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^%%(\d+)").expect("valid regex"));

/// Maps `(provider, channel, id)` to human-readable message strings.
///
/// Implementations must be safe to share across threads, since chunks may
/// be decoded in parallel around a single resolver. Lookup misses are not
/// errors; they return the empty string.
pub trait MessageResolver: Send + Sync {
    /// The raw message template with `%N` placeholders, or empty if unknown.
    fn get_message(&self, provider: &str, channel: &str, event_id: i64) -> String;

    /// Resolve a `%%N` parameter reference, or empty if unknown.
    fn get_parameter(&self, provider: &str, channel: &str, parameter_id: i64) -> String;

    /// Release any held resources.
    fn close(&self) {}
}

/// Resolver that knows nothing. Decoding works fine without message
/// databases; events then simply carry an empty `Message`.
pub struct NullResolver;

impl MessageResolver for NullResolver {
    fn get_message(&self, _provider: &str, _channel: &str, _event_id: i64) -> String {
        String::new()
    }

    fn get_parameter(&self, _provider: &str, _channel: &str, _parameter_id: i64) -> String {
        String::new()
    }
}

/// Look up the message template for an expanded event and interpolate it.
///
/// The GUID-keyed message is preferred; the provider-name key is the
/// fallback. Returns the empty string when the resolver knows neither.
pub fn expand_message(event: &Value, resolver: &dyn MessageResolver) -> String {
    let system = &event["System"];
    let provider_name = system["Provider"]["Name"].as_str().unwrap_or("");
    let provider_guid = system["Provider"]["Guid"].as_str().unwrap_or("");
    let channel = text_of(&system["Channel"]);
    let event_id = event_id_of(system);

    let mut provider_key = provider_guid;
    let mut message = if provider_guid.is_empty() {
        String::new()
    } else {
        resolver.get_message(provider_guid, channel, event_id)
    };
    if message.is_empty() && !provider_name.is_empty() {
        provider_key = provider_name;
        message = resolver.get_message(provider_name, channel, event_id);
    }
    if message.is_empty() {
        return String::new();
    }

    let data = event
        .get("UserData")
        .or_else(|| event.get("EventData"))
        .and_then(Value::as_object);
    let Some(data) = data else {
        // Nothing to interpolate from.
        return message;
    };
    let expansions = flatten(data);

    EXPANSION_RE
        .replace_all(&message, |caps: &Captures| {
            substitute(caps, &expansions, resolver, provider_key, channel)
        })
        .into_owned()
}

fn substitute(
    caps: &Captures,
    expansions: &[Value],
    resolver: &dyn MessageResolver,
    provider_key: &str,
    channel: &str,
) -> String {
    if let Some(parameter_id) = caps.get(1) {
        let parameter_id = parameter_id.as_str().parse::<i64>().unwrap_or(0);
        return resolver.get_parameter(provider_key, channel, parameter_id);
    }

    let token = &caps[0];
    match token {
        "%n" => "\n".to_string(),
        "%r" => String::new(),
        "%t" => "\t".to_string(),
        _ => {
            // Message expansions are one-based.
            let index = token[1..].parse::<i64>().unwrap_or(0) - 1;
            let value = match usize::try_from(index).ok().and_then(|i| expansions.get(i)) {
                Some(value) => format_expansion(value),
                None => return token.to_string(),
            };

            // Values of the form `%%N` are parameter references themselves.
            if let Some(param) = PARAMETER_RE.captures(&value) {
                let parameter_id = param[1].parse::<i64>().unwrap_or(0);
                return resolver.get_parameter(provider_key, channel, parameter_id);
            }
            value
        }
    }
}

/// Depth-first flattening of event data: nested dicts are walked in key
/// order, string lists are spliced, scalars are appended.
fn flatten(data: &Map<String, Value>) -> Vec<Value> {
    let mut result = Vec::new();
    for value in data.values() {
        match value {
            Value::Object(nested) => result.extend(flatten(nested)),
            Value::Array(items) if items.iter().all(Value::is_string) => {
                result.extend(items.iter().cloned());
            }
            other => result.push(other.clone()),
        }
    }
    result
}

fn format_expansion(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn text_of(value: &Value) -> &str {
    value
        .as_str()
        .or_else(|| value["Value"].as_str())
        .unwrap_or("")
}

fn event_id_of(system: &Value) -> i64 {
    let event_id = &system["EventID"];
    event_id
        .as_i64()
        .or_else(|| event_id["Value"].as_i64())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct FakeResolver {
        message: &'static str,
    }

    impl MessageResolver for FakeResolver {
        fn get_message(&self, provider: &str, _channel: &str, event_id: i64) -> String {
            if provider == "{54849625-5478-4994-A5BA-3E3B0328C30D}" && event_id == 4624 {
                self.message.to_string()
            } else {
                String::new()
            }
        }

        fn get_parameter(&self, _provider: &str, _channel: &str, parameter_id: i64) -> String {
            match parameter_id {
                11 => "interactive".to_string(),
                _ => String::new(),
            }
        }
    }

    fn logon_event() -> Value {
        json!({
            "System": {
                "Provider": {
                    "Name": "Microsoft-Windows-Security-Auditing",
                    "Guid": "{54849625-5478-4994-A5BA-3E3B0328C30D}"
                },
                "EventID": {"Qualifiers": 0, "Value": 4624},
                "Channel": "Security"
            },
            "EventData": {"User": "alice"}
        })
    }

    #[test]
    fn test_substitutes_expansions_and_parameters() {
        let resolver = FakeResolver {
            message: "User %1 logged in (%%11)",
        };
        assert_eq!(
            expand_message(&logon_event(), &resolver),
            "User alice logged in (interactive)"
        );
    }

    #[test]
    fn test_control_tokens() {
        let resolver = FakeResolver {
            message: "a%nb%tc%rd",
        };
        assert_eq!(expand_message(&logon_event(), &resolver), "a\nb\tcd");
    }

    #[test]
    fn test_out_of_range_expansion_keeps_the_literal() {
        let resolver = FakeResolver { message: "x %5 y" };
        assert_eq!(expand_message(&logon_event(), &resolver), "x %5 y");
    }

    #[test]
    fn test_parameter_valued_expansion_goes_through_the_resolver() {
        let resolver = FakeResolver { message: "mode=%2" };
        let mut event = logon_event();
        event["EventData"] = json!({"User": "alice", "LogonKind": "%%11"});
        assert_eq!(expand_message(&event, &resolver), "mode=interactive");
    }

    #[test]
    fn test_unknown_message_is_empty() {
        let mut event = logon_event();
        event["System"]["EventID"] = json!(1102);
        let resolver = FakeResolver { message: "unused" };
        assert_eq!(expand_message(&event, &resolver), "");
        assert_eq!(expand_message(&event, &NullResolver), "");
    }

    #[test]
    fn test_user_data_is_preferred_over_event_data() {
        struct NameResolver;
        impl MessageResolver for NameResolver {
            fn get_message(&self, provider: &str, _channel: &str, _event_id: i64) -> String {
                assert_eq!(provider, "CAPI2");
                "%1 then %2 then %3".to_string()
            }
            fn get_parameter(&self, _: &str, _: &str, _: i64) -> String {
                String::new()
            }
        }

        let event = json!({
            "System": {
                "Provider": {"Name": "CAPI2"},
                "EventID": 70,
                "Channel": "Application"
            },
            "UserData": {
                "Operation": {"Detail": "verify", "Flags": ["a", "b"]}
            },
            "EventData": {"ignored": true}
        });

        assert_eq!(expand_message(&event, &NameResolver), "verify then a then b");
    }

    #[test]
    fn test_message_without_event_data_is_returned_verbatim() {
        let resolver = FakeResolver {
            message: "static text %1",
        };
        let mut event = logon_event();
        event.as_object_mut().unwrap().remove("EventData");
        assert_eq!(expand_message(&event, &resolver), "static text %1");
    }
}
