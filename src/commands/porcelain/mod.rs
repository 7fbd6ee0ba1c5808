//! Porcelain commands (user-facing Git operations)
//!
//! Porcelain commands provide the high-level user interface for version control.
//! They compose plumbing commands and internal operations into workflows that
//! match typical Git usage patterns.
//!
//! ## Commands
//!
//! - `init`: Initialize a new repository
//! - `add` / `rm`: Stage or unstage files
//! - `commit`: Create a new commit
//! - `status`: Show working tree status
//! - `diff`: Show changes between commits/trees
//! - `log`: Show commit history
//! - `branch`: Create, list, or delete branches
//! - `checkout`: Switch branches or detach HEAD
//! - `reset`: Move HEAD and optionally the index and workspace
//! - `merge`: Join another line of history into HEAD
//! - `cherry-pick` / `revert`: Replay or undo commits through the sequencer
//! - `config`: Read and write repository settings
//! - `remote`, `fetch`, `push`: Exchange history with other repositories

pub mod add;
pub mod branch;
pub mod checkout;
pub mod cherry_pick;
pub mod commit;
pub mod config;
pub mod diff;
pub mod fetch;
pub mod init;
pub mod log;
pub mod merge;
pub mod push;
pub mod remote;
pub mod reset;
pub mod rm;
pub mod status;
