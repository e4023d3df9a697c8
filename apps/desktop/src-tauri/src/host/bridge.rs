//! # Script Bridge
//!
//! Runs async scripts inside a webview and waits for their result.
//!
//! `eval` is fire-and-forget, so every call carries a request id. The script
//! posts its result back through the `print_surface_reply` command, which
//! resolves the matching waiter here.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  call(window, body)                                                     │
//! │     │  register id ──► pending[id] = oneshot                            │
//! │     │  window.eval( (async () => { body })()                            │
//! │     │                 .then(value => invoke('print_surface_reply',      │
//! │     │                        { reply: { requestId: id, ok, value } })) )│
//! │     ▼                                                                   │
//! │  await oneshot (bounded) ◄── resolve(reply) ◄── print_surface_reply     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use super::webview::SurfaceWindow;
use super::HostError;

/// Command the scripts answer through.
pub const REPLY_COMMAND: &str = "print_surface_reply";

/// Result posted by a script.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptReply {
    pub request_id: u64,
    pub ok: bool,
    #[serde(default)]
    pub value: Value,
}

impl ScriptReply {
    fn into_result(self) -> Result<Value, HostError> {
        if self.ok {
            Ok(self.value)
        } else {
            let message = match self.value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            Err(HostError::Script(message))
        }
    }
}

/// Outstanding script calls, shared by every print window.
#[derive(Default)]
pub struct ScriptBridge {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<ScriptReply>>>,
}

impl ScriptBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates `body` (the body of an async function) in `window` and
    /// returns what it resolved to.
    pub async fn call(
        &self,
        window: &dyn SurfaceWindow,
        body: &str,
        limit: Duration,
    ) -> Result<Value, HostError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.lock().insert(id, tx);
        // Unregisters on every exit path, including a dropped future.
        let _pending = Pending { bridge: self, id };

        window.eval(&wrap_script(id, body))?;

        match tokio::time::timeout(limit, rx).await {
            Ok(Ok(reply)) => reply.into_result(),
            Ok(Err(_)) => Err(HostError::Script("reply dropped".into())),
            Err(_) => Err(HostError::Script(format!(
                "no reply within {} ms",
                limit.as_millis()
            ))),
        }
    }

    /// Hands a reply to its waiter. False when nobody waits for it anymore.
    pub fn resolve(&self, reply: ScriptReply) -> bool {
        let waiter = self.lock().remove(&reply.request_id);
        match waiter {
            Some(tx) => tx.send(reply).is_ok(),
            None => {
                debug!(request_id = reply.request_id, "Late script reply dropped");
                false
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn forget(&self, id: u64) {
        self.lock().remove(&id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<ScriptReply>>> {
        // A panic while holding the map leaves it consistent.
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct Pending<'a> {
    bridge: &'a ScriptBridge,
    id: u64,
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        self.bridge.forget(self.id);
    }
}

/// Wraps a script body so its outcome is posted back with `id`.
fn wrap_script(id: u64, body: &str) -> String {
    format!(
        r#"(async () => {{
  const requestId = {id};
  let reply;
  try {{
    const value = await (async () => {{
{body}
    }})();
    reply = {{ requestId, ok: true, value: value === undefined ? null : value }};
  }} catch (e) {{
    reply = {{ requestId, ok: false, value: String((e && e.message) || e) }};
  }}
  await window.__TAURI__.core.invoke('{command}', {{ reply }});
}})();"#,
        id = id,
        body = body,
        command = REPLY_COMMAND,
    )
}

/// Request id of a wrapped script.
#[cfg(test)]
pub(crate) fn request_id_of(script: &str) -> Option<u64> {
    let rest = script.split("const requestId = ").nth(1)?;
    rest.split(';').next()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Window that answers every script with a fixed reply.
    struct EchoWindow {
        bridge: Arc<ScriptBridge>,
        answer: Option<(bool, Value)>,
        scripts: Mutex<Vec<String>>,
    }

    impl SurfaceWindow for EchoWindow {
        fn eval(&self, script: &str) -> Result<(), HostError> {
            self.scripts.lock().unwrap().push(script.to_string());
            if let Some((ok, value)) = self.answer.clone() {
                let request_id = request_id_of(script).unwrap();
                self.bridge.resolve(ScriptReply { request_id, ok, value });
            }
            Ok(())
        }

        fn show(&self) -> Result<(), HostError> {
            Ok(())
        }

        fn close(&self) -> Result<(), HostError> {
            Ok(())
        }
    }

    fn window(bridge: &Arc<ScriptBridge>, answer: Option<(bool, Value)>) -> EchoWindow {
        EchoWindow {
            bridge: bridge.clone(),
            answer,
            scripts: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn test_call_returns_script_value() {
        let bridge = Arc::new(ScriptBridge::new());
        let win = window(&bridge, Some((true, serde_json::json!({ "height": 600 }))));

        let value = bridge
            .call(&win, "return 1;", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(value["height"], 600);

        let scripts = win.scripts.lock().unwrap();
        assert!(scripts[0].contains("return 1;"));
        assert!(scripts[0].contains("invoke('print_surface_reply'"));
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_script_failure_is_error() {
        let bridge = Arc::new(ScriptBridge::new());
        let win = window(&bridge, Some((false, Value::String("capture failed".into()))));

        let err = bridge
            .call(&win, "throw new Error('x');", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("capture failed"));
    }

    #[tokio::test]
    async fn test_silent_window_times_out_and_forgets() {
        let bridge = Arc::new(ScriptBridge::new());
        let win = window(&bridge, None);

        let err = bridge
            .call(&win, "return 1;", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no reply"));
        assert_eq!(bridge.pending_count(), 0);

        // an abandoned call unregisters too
        let abandoned = bridge.call(&win, "return 2;", Duration::from_secs(60));
        let _ = tokio::time::timeout(Duration::from_millis(10), abandoned).await;
        assert_eq!(bridge.pending_count(), 0);

        // a reply arriving after the deadline is dropped
        assert!(!bridge.resolve(ScriptReply {
            request_id: 1,
            ok: true,
            value: Value::Null,
        }));
    }

    #[test]
    fn test_reply_payload_shape() {
        let reply: ScriptReply = serde_json::from_value(serde_json::json!({
            "requestId": 7,
            "ok": true,
            "value": { "width": 302, "height": 588 }
        }))
        .unwrap();
        assert_eq!(reply.request_id, 7);
        assert_eq!(request_id_of(&wrap_script(7, "")), Some(7));
    }
}
