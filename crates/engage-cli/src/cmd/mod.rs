pub mod carousel;
pub mod comment;
pub mod comments;
pub mod completions;
pub mod react;
pub mod reactions;
pub mod sim;
pub mod whoami;
