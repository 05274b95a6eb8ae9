//! Status notifier that writes JSON lines to a stream.
//!
//! Stands in for a chat platform: every create, edit and delete becomes one
//! line on stdout, and identical edits are refused the way chat APIs do.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};

use mediadrop_pipeline::notifier::NotifierFuture;
use mediadrop_pipeline::{
    CallbackAction, ConversationRef, JobId, MessageRef, NotifierError, StatusNotifier,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum StatusLine<'a> {
    Create {
        chat_id: i64,
        message_id: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        reply_to: Option<i64>,
        text: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        callback: Option<String>,
    },
    Edit {
        chat_id: i64,
        message_id: i64,
        text: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        callback: Option<String>,
    },
    Delete {
        chat_id: i64,
        message_id: i64,
    },
}

pub struct ConsoleNotifier {
    out: Mutex<Box<dyn Write + Send>>,
    texts: Mutex<HashMap<MessageRef, String>>,
    next_id: AtomicI64,
}

impl ConsoleNotifier {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            texts: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    fn emit(&self, line: &StatusLine<'_>) -> Result<(), NotifierError> {
        let json =
            serde_json::to_string(line).map_err(|e| NotifierError::Delivery(e.to_string()))?;
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{json}")
            .and_then(|()| out.flush())
            .map_err(|e| NotifierError::Delivery(e.to_string()))
    }
}

fn callback(cancel: Option<JobId>) -> Option<String> {
    cancel.map(|id| CallbackAction::Cancel(id).encode())
}

impl StatusNotifier for ConsoleNotifier {
    fn create_status_message<'a>(
        &'a self,
        conversation: &'a ConversationRef,
        text: &'a str,
        cancel: Option<JobId>,
    ) -> NotifierFuture<'a, MessageRef> {
        Box::pin(async move {
            let message = MessageRef {
                chat_id: conversation.chat_id,
                message_id: self.next_id.fetch_add(1, Ordering::Relaxed),
            };
            self.emit(&StatusLine::Create {
                chat_id: message.chat_id,
                message_id: message.message_id,
                reply_to: conversation.message_id,
                text,
                callback: callback(cancel),
            })?;
            self.texts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(message.clone(), text.to_string());
            Ok::<_, NotifierError>(message)
        })
    }

    fn update_status_message<'a>(
        &'a self,
        message: &'a MessageRef,
        text: &'a str,
        cancel: Option<JobId>,
    ) -> NotifierFuture<'a, ()> {
        Box::pin(async move {
            {
                let mut texts = self.texts.lock().unwrap_or_else(PoisonError::into_inner);
                if texts.get(message).is_some_and(|t| t == text) {
                    return Err(NotifierError::NotModified);
                }
                texts.insert(message.clone(), text.to_string());
            }
            self.emit(&StatusLine::Edit {
                chat_id: message.chat_id,
                message_id: message.message_id,
                text,
                callback: callback(cancel),
            })
        })
    }

    fn delete_status_message<'a>(&'a self, message: &'a MessageRef) -> NotifierFuture<'a, ()> {
        Box::pin(async move {
            self.texts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(message);
            self.emit(&StatusLine::Delete {
                chat_id: message.chat_id,
                message_id: message.message_id,
            })
        })
    }
}
