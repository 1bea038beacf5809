//! Posting new comments and replies.
//!
//! A draft is validated locally first; nothing reaches the remote unless it
//! passes. The created comment is appended to the caller's [`CommentStore`]
//! and its [`Placement`] returned so the view can focus it.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::comment::{CommentStore, Placement, ThreadShapeError};
use crate::config::SubmissionConfig;
use crate::error::ErrorCode;
use crate::model::{Comment, NewComment};
use crate::remote::{RemoteError, RemoteStore};

/// Draft field a validation failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Post,
    AuthorName,
    AuthorEmail,
    Content,
    ParentId,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Post => "post_id",
            Self::AuthorName => "author_name",
            Self::AuthorEmail => "author_email",
            Self::Content => "content",
            Self::ParentId => "parent_id",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: Field,
    pub reason: String,
}

impl ValidationError {
    fn new(field: Field, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::ValidationFailed
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("comment could not be posted: {0}")]
    Remote(#[source] RemoteError),

    #[error("created comment does not fit the thread: {0}")]
    Rejected(#[source] ThreadShapeError),
}

impl SubmissionError {
    /// Rejections are not retryable: the remote already holds the comment.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Remote(_) => ErrorCode::SubmissionFailed,
            Self::Rejected(_) => ErrorCode::SubmissionRejected,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),
}

impl SubmitError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(err) => err.code(),
            Self::Submission(err) => err.code(),
        }
    }
}

pub struct SubmissionPipeline {
    remote: Arc<dyn RemoteStore>,
    limits: SubmissionConfig,
}

impl fmt::Debug for SubmissionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmissionPipeline")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl SubmissionPipeline {
    pub fn new(remote: Arc<dyn RemoteStore>, limits: SubmissionConfig) -> Self {
        Self { remote, limits }
    }

    /// Check `draft` against `store` and return the normalized draft that
    /// would be sent.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(
        &self,
        store: &CommentStore,
        draft: &NewComment,
    ) -> Result<NewComment, ValidationError> {
        if &draft.post_id != store.post_id() {
            return Err(ValidationError::new(
                Field::Post,
                format!("draft is for {}, thread is {}", draft.post_id, store.post_id()),
            ));
        }

        let author_name = draft.author_name.trim();
        if author_name.is_empty() {
            return Err(ValidationError::new(Field::AuthorName, "name is required"));
        }
        if author_name.chars().count() > self.limits.max_author_chars {
            return Err(ValidationError::new(
                Field::AuthorName,
                format!("name exceeds {} characters", self.limits.max_author_chars),
            ));
        }
        if author_name.chars().any(char::is_control) {
            return Err(ValidationError::new(
                Field::AuthorName,
                "name contains control characters",
            ));
        }

        let author_email = draft
            .author_email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty());
        if let Some(email) = author_email
            && !looks_like_email(email)
        {
            return Err(ValidationError::new(
                Field::AuthorEmail,
                "email must look like name@host",
            ));
        }

        let content = draft.content.trim();
        if content.is_empty() {
            return Err(ValidationError::new(Field::Content, "comment is empty"));
        }
        if content.chars().count() > self.limits.max_content_chars {
            return Err(ValidationError::new(
                Field::Content,
                format!("comment exceeds {} characters", self.limits.max_content_chars),
            ));
        }
        if content
            .chars()
            .any(|c| c.is_control() && !matches!(c, '\n' | '\t' | '\r'))
        {
            return Err(ValidationError::new(
                Field::Content,
                "comment contains control characters",
            ));
        }

        if let Some(parent_id) = &draft.parent_id {
            match store.get(parent_id) {
                None => {
                    return Err(ValidationError::new(
                        Field::ParentId,
                        format!("comment {parent_id} does not exist"),
                    ));
                }
                Some(parent) if !parent.is_top_level() => {
                    return Err(ValidationError::new(
                        Field::ParentId,
                        "replies can only target top-level comments",
                    ));
                }
                Some(_) => {}
            }
        }

        Ok(NewComment {
            post_id: draft.post_id.clone(),
            parent_id: draft.parent_id.clone(),
            author_name: author_name.to_string(),
            author_email: author_email.map(str::to_string),
            content: content.to_string(),
        })
    }

    /// Validate, create remotely, and append to `store`.
    ///
    /// # Errors
    ///
    /// [`SubmitError::Validation`] before any remote call;
    /// [`SubmitError::Submission`] if the remote fails or returns a comment
    /// the store refuses. `store` is unchanged in every error case.
    pub fn submit(
        &self,
        store: &mut CommentStore,
        draft: &NewComment,
    ) -> Result<(Comment, Placement), SubmitError> {
        let normalized = self.validate(store, draft)?;

        let created = self
            .remote
            .create_comment(&normalized)
            .map_err(SubmissionError::Remote)?;

        let placement = store.append(created.clone()).map_err(|err| {
            warn!(comment = %created.id, error = %err, "server comment rejected by thread");
            SubmissionError::Rejected(err)
        })?;

        info!(
            post = %created.post_id,
            comment = %created.id,
            reply = created.parent_id.is_some(),
            "comment posted"
        );
        Ok((created, placement))
    }
}

fn looks_like_email(raw: &str) -> bool {
    let mut parts = raw.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(host), None) => {
            !local.is_empty() && !host.is_empty() && !raw.chars().any(char::is_whitespace)
        }
        _ => false,
    }
}
