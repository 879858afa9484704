//! Retry feedback: validation errors rendered into a block appended to the
//! specification for the next attempt.

use std::io::ErrorKind;
use std::path::Path;

use serde::Serialize;
use tera::{Context, Tera};

use regen_core::ValidationError;

use crate::error::{io_err, SyncError};

/// Template name; also the file name looked up in a user template directory.
pub const FEEDBACK_TEMPLATE: &str = "feedback.md.tera";

const EMBEDDED: &str = include_str!("templates/feedback.md.tera");

#[derive(Serialize)]
struct FeedbackContext {
    attempt: u32,
    /// Display form of each error, unmodified.
    errors: Vec<String>,
}

/// Renders feedback blocks from the embedded template, or from
/// `<user_template_dir>/feedback.md.tera` when present.
pub struct FeedbackRenderer {
    tera: Tera,
}

impl FeedbackRenderer {
    pub fn new(user_template_dir: Option<&Path>) -> Result<Self, SyncError> {
        let mut source = EMBEDDED.to_string();
        if let Some(dir) = user_template_dir {
            let path = dir.join(FEEDBACK_TEMPLATE);
            match std::fs::read_to_string(&path) {
                Ok(contents) => {
                    tracing::debug!(path = %path.display(), "using feedback template override");
                    source = contents;
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(io_err(&path, err)),
            }
        }

        let mut tera = Tera::default();
        tera.add_raw_template(FEEDBACK_TEMPLATE, &source)?;
        Ok(Self { tera })
    }

    /// One feedback block for the errors of `attempt`.
    pub fn render(&self, attempt: u32, errors: &[ValidationError]) -> Result<String, SyncError> {
        let ctx = FeedbackContext {
            attempt,
            errors: errors.iter().map(ToString::to_string).collect(),
        };
        let ctx = Context::from_serialize(&ctx)?;
        Ok(self.tera.render(FEEDBACK_TEMPLATE, &ctx)?)
    }
}

/// The original specification followed by every feedback block so far.
pub fn compose(original: &str, blocks: &[String]) -> String {
    let mut text = original.to_string();
    for block in blocks {
        if !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(block);
    }
    text
}
