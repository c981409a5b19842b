//! JSON-line command protocol spoken on stdin / stdout.

use intent_core::{meta::INTENT_CREATE, Actor, ContextBag, ExecutionRequest, IntentExecutor};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Execute {
        intent_code: String,
        request: ExecutionRequest,
    },
    Preview {
        intent_code: String,
        request: ExecutionRequest,
    },
    Confirm {
        token: String,
        actor: Actor,
    },
    Match {
        text: String,
        actor: Actor,
    },
    /// Shorthand for a previewed INTENT_CREATE.
    CreateIntent {
        actor: Actor,
        #[serde(default)]
        fields: ContextBag,
    },
    Pending,
}

/// Handles one input line and returns the reply line.
pub async fn handle_line(executor: &IntentExecutor, line: &str) -> Value {
    match serde_json::from_str::<Command>(line) {
        Ok(command) => run(executor, command).await,
        Err(e) => json!({ "error": "bad_command", "message": e.to_string() }),
    }
}

pub async fn run(executor: &IntentExecutor, command: Command) -> Value {
    let response = match command {
        Command::Execute { intent_code, request } => executor.execute(&intent_code, request).await,
        Command::Preview { intent_code, request } => executor.preview(&intent_code, request).await,
        Command::Confirm { token, actor } => executor.confirm(&token, &actor).await,
        Command::CreateIntent { actor, fields } => {
            let mut request = ExecutionRequest::new("", actor);
            request.context = fields;
            executor.preview(INTENT_CREATE, request).await
        }
        Command::Match { text, actor } => {
            return match executor.match_intents(&text, &actor) {
                Ok(matches) => json!({ "matches": matches }),
                Err(e) => json!({ "error": e.kind(), "message": e.to_string() }),
            };
        }
        Command::Pending => {
            return match executor.pending_confirmations() {
                Ok(count) => json!({ "pending": count }),
                Err(e) => json!({ "error": e.kind(), "message": e.to_string() }),
            };
        }
    };
    serde_json::to_value(&response).unwrap_or_else(|e| json!({ "error": "encode", "message": e.to_string() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use intent_core::{bootstrap, HandlerRegistry, IntentConfig};

    fn executor() -> IntentExecutor {
        bootstrap(&IntentConfig::default(), HandlerRegistry::new(), Vec::new()).unwrap()
    }

    #[tokio::test]
    async fn malformed_line_is_reported() {
        let reply = handle_line(&executor(), "{\"command\":\"launch\"}").await;
        assert_eq!(reply["error"], "bad_command");
    }

    #[tokio::test]
    async fn create_intent_previews_then_confirms() {
        let executor = executor();
        let line = json!({
            "command": "create_intent",
            "actor": { "user_id": 1, "role": "factory_admin", "tenant_id": "F1" },
            "fields": {
                "intent_code": "shift_report",
                "category": "report",
                "name": "Shift report",
                "keywords": ["shift report"]
            }
        });
        let preview = handle_line(&executor, &line.to_string()).await;
        assert_eq!(preview["status"], "PREVIEW");
        let token = preview["confirmable_action"]["confirm_token"].as_str().unwrap().to_string();

        let pending = handle_line(&executor, "{\"command\":\"pending\"}").await;
        assert_eq!(pending["pending"], 1);

        let confirm = json!({
            "command": "confirm",
            "token": token,
            "actor": { "user_id": 1, "role": "factory_admin", "tenant_id": "F1" }
        });
        let done = handle_line(&executor, &confirm.to_string()).await;
        assert_eq!(done["status"], "COMPLETED");

        let matched = json!({
            "command": "match",
            "text": "send me the shift report",
            "actor": { "user_id": 2, "role": "operator", "tenant_id": "F1" }
        });
        let reply = handle_line(&executor, &matched.to_string()).await;
        assert_eq!(reply["matches"][0]["intent_code"], "SHIFT_REPORT");
    }
}
