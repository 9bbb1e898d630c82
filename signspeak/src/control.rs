//! Control commands — parse s-expressions and route to the session.
//!
//! One command per line, plist form: `(:type :teach :id 3 :label "HELLO")`.
//! Every command gets exactly one response plist.

use lexpr::Value;
use tracing::{debug, warn};

use crate::classifier::GestureClassifier;
use crate::gesture::SentenceEvent;
use crate::session::{string_list, SignSession};
use crate::storage::KeyValueStore;

/// Parse one command line and apply it.  Returns the response line, or
/// `None` for blank input.
pub fn handle_command<C, K>(session: &mut SignSession<C, K>, raw: &str) -> Option<String>
where
    C: GestureClassifier,
    K: KeyValueStore,
{
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let value = match lexpr::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("malformed command: {}", e);
            return Some(error_response(0, &format!("malformed s-expression: {e}")));
        }
    };

    let cmd_type = get_keyword(&value, "type");
    let msg_id = get_int(&value, "id").unwrap_or(0);
    debug!(cmd = ?cmd_type, msg_id, "control command");

    if !session.is_alive() {
        return Some(error_response(msg_id, "session has been torn down"));
    }

    let response = match cmd_type.as_deref() {
        Some("teach") => handle_teach(session, msg_id, &value),
        Some("cancel-training") => handle_cancel_training(session, msg_id),
        Some("delete-gesture") => handle_delete_gesture(session, msg_id, &value),
        Some("speak") => handle_speak(session, msg_id),
        Some("delete-word") => {
            session.apply(SentenceEvent::DeleteLastWord);
            ok_response(msg_id)
        }
        Some("clear") => {
            session.apply(SentenceEvent::Clear);
            ok_response(msg_id)
        }
        Some("status") => format!(
            "(:type :response :id {} :status :ok :session {})",
            msg_id,
            session.status_sexp()
        ),
        Some("library") => format!(
            "(:type :response :id {} :status :ok :labels {})",
            msg_id,
            string_list(session.known_labels())
        ),
        Some("suggestions") => format!(
            "(:type :response :id {} :status :ok :gestures {})",
            msg_id,
            string_list(session.suggestions())
        ),
        Some("config") => format!(
            "(:type :response :id {} :status :ok :stabilizer {} :training {})",
            msg_id,
            session.stabilizer().config_sexp(),
            session.training().config_sexp()
        ),
        Some("switch-source") => {
            session.switch_source();
            ok_response(msg_id)
        }
        Some(other) => error_response(msg_id, &format!("unknown command type: {other}")),
        None => error_response(msg_id, "missing :type field"),
    };
    Some(response)
}

// ── Handlers ───────────────────────────────────────────────

fn handle_teach<C: GestureClassifier, K: KeyValueStore>(
    session: &mut SignSession<C, K>,
    msg_id: i64,
    value: &Value,
) -> String {
    let label = get_string(value, "label").unwrap_or_default();
    match session.teach(&label) {
        Ok(()) => ok_response(msg_id),
        Err(e) => error_response(msg_id, &e.to_string()),
    }
}

fn handle_cancel_training<C: GestureClassifier, K: KeyValueStore>(
    session: &mut SignSession<C, K>,
    msg_id: i64,
) -> String {
    match session.cancel_training() {
        Some(label) => format!(
            "(:type :response :id {} :status :ok :cancelled \"{}\")",
            msg_id,
            escape_string(&label)
        ),
        None => error_response(msg_id, "no training in progress"),
    }
}

fn handle_delete_gesture<C: GestureClassifier, K: KeyValueStore>(
    session: &mut SignSession<C, K>,
    msg_id: i64,
    value: &Value,
) -> String {
    let Some(label) = get_string(value, "label") else {
        return error_response(msg_id, "missing :label");
    };
    let removed = session.delete_gesture(&label);
    format!(
        "(:type :response :id {} :status :ok :removed {})",
        msg_id,
        if removed { "t" } else { "nil" }
    )
}

fn handle_speak<C: GestureClassifier, K: KeyValueStore>(
    session: &mut SignSession<C, K>,
    msg_id: i64,
) -> String {
    match session.speak() {
        Ok(()) => ok_response(msg_id),
        Err(e) => error_response(msg_id, &e.to_string()),
    }
}

// ── Helpers ────────────────────────────────────────────────

fn ok_response(id: i64) -> String {
    format!("(:type :response :id {} :status :ok)", id)
}

fn error_response(id: i64, reason: &str) -> String {
    format!(
        "(:type :response :id {} :status :error :reason \"{}\")",
        id,
        escape_string(reason)
    )
}

/// Escape a string for s-expression output.
pub fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Extract a keyword value from an s-expression plist.
/// Handles both `Value::Keyword("key")` and `Value::Symbol(":key")` forms.
fn get_keyword(value: &Value, key: &str) -> Option<String> {
    let prefixed = format!(":{}", key);
    let mut current = value;
    while let Value::Cons(pair) = current {
        let is_key = match pair.car() {
            Value::Keyword(k) => k.as_ref() == key,
            Value::Symbol(s) => s.as_ref() == prefixed,
            _ => false,
        };
        if !is_key {
            current = pair.cdr();
            continue;
        }
        let Value::Cons(next) = pair.cdr() else {
            return None;
        };
        return match next.car() {
            Value::Keyword(v) => Some(v.to_string()),
            Value::Symbol(v) => {
                let s = v.to_string();
                Some(s.strip_prefix(':').unwrap_or(&s).to_string())
            }
            Value::String(v) => Some(v.to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(if *b { "t" } else { "nil" }.to_string()),
            Value::Null => Some("nil".to_string()),
            other => Some(other.to_string()),
        };
    }
    None
}

fn get_int(value: &Value, key: &str) -> Option<i64> {
    get_keyword(value, key).and_then(|s| s.parse().ok())
}

fn get_string(value: &Value, key: &str) -> Option<String> {
    get_keyword(value, key)
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::KnnClassifier;
    use crate::session::SessionConfig;
    use crate::speech::testing::recording_handle;
    use crate::storage::MemoryStore;

    fn session() -> SignSession<KnnClassifier, MemoryStore> {
        let (speech, _) = recording_handle(0);
        SignSession::new(
            SessionConfig::default(),
            KnnClassifier::default(),
            MemoryStore::new(),
            speech,
        )
    }

    #[test]
    fn test_ok_response_format() {
        let r = ok_response(42);
        assert!(r.contains(":type :response"));
        assert!(r.contains(":id 42"));
        assert!(r.contains(":status :ok"));
    }

    #[test]
    fn test_error_response_escapes_quotes() {
        let r = error_response(1, "say \"hello\"");
        assert!(r.contains(":status :error"));
        assert!(r.contains("say \\\"hello\\\""));
    }

    #[test]
    fn test_escape_string_backslash() {
        assert_eq!(escape_string("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_get_keyword_from_plist() {
        let v = lexpr::from_str("(:type :teach :id 9 :label \"THANK YOU\")").unwrap();
        assert_eq!(get_keyword(&v, "type"), Some("teach".to_string()));
        assert_eq!(get_int(&v, "id"), Some(9));
        assert_eq!(get_string(&v, "label"), Some("THANK YOU".to_string()));
        assert_eq!(get_keyword(&v, "missing"), None);
    }

    #[test]
    fn test_blank_line_ignored() {
        let mut s = session();
        assert_eq!(handle_command(&mut s, "   "), None);
    }

    #[test]
    fn test_malformed() {
        let mut s = session();
        let r = handle_command(&mut s, "(:type").unwrap();
        assert!(r.contains(":status :error"));
    }

    #[test]
    fn test_missing_and_unknown_type() {
        let mut s = session();
        let r = handle_command(&mut s, "(:id 1)").unwrap();
        assert!(r.contains("missing :type"));
        let r = handle_command(&mut s, "(:type :dance :id 2)").unwrap();
        assert!(r.contains("unknown command type: dance"));
        assert!(r.contains(":id 2"));
    }

    #[test]
    fn test_teach_and_cancel() {
        let mut s = session();
        let r = handle_command(&mut s, "(:type :teach :id 1 :label \"hello\")").unwrap();
        assert!(r.contains(":status :ok"), "{r}");
        assert_eq!(s.training().active_label(), Some("HELLO"));

        let r = handle_command(&mut s, "(:type :teach :id 2 :label \"yes\")").unwrap();
        assert!(r.contains("already in progress"), "{r}");

        let r = handle_command(&mut s, "(:type :cancel-training :id 3)").unwrap();
        assert!(r.contains(":cancelled \"HELLO\""), "{r}");
        let r = handle_command(&mut s, "(:type :cancel-training :id 4)").unwrap();
        assert!(r.contains(":status :error"));
    }

    #[test]
    fn test_teach_empty_label() {
        let mut s = session();
        let r = handle_command(&mut s, "(:type :teach :id 1)").unwrap();
        assert!(r.contains("gesture name is empty"), "{r}");
    }

    #[test]
    fn test_sentence_commands() {
        let mut s = session();
        s.apply(SentenceEvent::AppendWord("A".into()));
        s.apply(SentenceEvent::AppendWord("B".into()));
        handle_command(&mut s, "(:type :delete-word)").unwrap();
        assert_eq!(s.sentence().text(), "A");
        handle_command(&mut s, "(:type :clear)").unwrap();
        assert!(s.sentence().is_empty());
        let r = handle_command(&mut s, "(:type :speak :id 5)").unwrap();
        assert!(r.contains(":status :ok"));
    }

    #[test]
    fn test_delete_gesture_command() {
        let mut s = session();
        let r = handle_command(&mut s, "(:type :delete-gesture :id 1 :label \"nope\")").unwrap();
        assert!(r.contains(":removed nil"));
        let r = handle_command(&mut s, "(:type :delete-gesture :id 2)").unwrap();
        assert!(r.contains("missing :label"));
    }

    #[test]
    fn test_queries() {
        let mut s = session();
        let r = handle_command(&mut s, "(:type :suggestions)").unwrap();
        assert!(r.contains(":gestures (\"HELLO\" \"YES\""));
        let r = handle_command(&mut s, "(:type :library)").unwrap();
        assert!(r.contains(":labels ()"));
        let r = handle_command(&mut s, "(:type :status)").unwrap();
        assert!(r.contains(":session (:status"));
        let r = handle_command(&mut s, "(:type :config)").unwrap();
        assert!(r.contains(":stable-frames 15"));
        assert!(r.contains(":capture-ms 3000"));
    }

    #[test]
    fn test_torn_down_session_rejects() {
        let mut s = session();
        s.teardown();
        let r = handle_command(&mut s, "(:type :status :id 3)").unwrap();
        assert!(r.contains("torn down"));
    }
}
