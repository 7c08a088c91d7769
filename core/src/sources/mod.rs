//! Where changes come from.

pub mod local_git;
pub mod traits;

pub use local_git::{LocalGitError, LocalGitSource};
pub use traits::{PatchSource, RepoInfo};
