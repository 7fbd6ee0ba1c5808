//! Plumbing commands (low-level Git operations)
//!
//! Plumbing commands provide direct access to the object database and the
//! two server roles of the pack protocol. They're primarily used for
//! scripting and as building blocks for porcelain commands.
//!
//! ## Commands
//!
//! - `cat-file`: Print an object's type, size or content
//! - `hash-object`: Compute object ID and optionally store in database
//! - `ls-tree`: List contents of a tree object
//! - `merge-base`: Find the best common ancestor of two commits
//! - `upload-pack`: Serve a fetch over stdin/stdout
//! - `receive-pack`: Serve a push over stdin/stdout

pub mod cat_file;
pub mod hash_object;
pub mod ls_tree;
pub mod merge_base;
pub mod receive_pack;
pub mod upload_pack;
