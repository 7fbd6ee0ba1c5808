use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use graft::areas::repository::Repository;
use graft::commands::plumbing::cat_file::CatFileMode;
use graft::commands::porcelain::log::LogOptions;
use graft::commands::porcelain::reset::ResetMode;
use graft::errors::RepoError;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "GRAFT_LOG";
const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Parser)]
#[command(
    name = "graft",
    version = "0.1.0",
    author = "Sami Barbut-Dica",
    about = "A distributed version control core",
    long_about = "graft stores content-addressed snapshots in a git-compatible object \
    database, merges diverging histories and exchanges packs with other repositories.",
    help_template = r"
{name} {version} - {about}

USAGE:
    {usage}

COMMANDS:
{subcommands}

OPTIONS:
    {options}
",
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(
        name = "init",
        about = "Initialize a new repository",
        long_about = "This command initializes a new repository in the current directory or at the specified path."
    )]
    Init {
        #[arg(index = 1, help = "The path to the repository")]
        path: Option<String>,
    },
    #[command(name = "add", about = "Add file contents to the index")]
    Add {
        #[arg(required = true, help = "Files or directories to stage")]
        paths: Vec<String>,
    },
    #[command(
        name = "rm",
        about = "Remove files from the index and the working tree",
        long_about = "This command removes tracked files from the index and, unless --cached is given, \
        from the working tree as well."
    )]
    Rm {
        #[arg(long, help = "Only remove the paths from the index")]
        cached: bool,
        #[arg(required = true)]
        paths: Vec<String>,
    },
    #[command(
        name = "commit",
        about = "Create a new commit with the specified message",
        long_about = "This command creates a new commit in the repository with the specified commit message. \
        Without a message, a pending merge, cherry-pick or revert message is reused."
    )]
    Commit {
        #[arg(short, long, help = "The commit message")]
        message: Option<String>,
    },
    #[command(name = "status", about = "Show the working tree status")]
    Status {
        #[arg(long, help = "Machine-readable two-column output")]
        porcelain: bool,
    },
    #[command(
        name = "diff",
        about = "Show changes between the workspace, the index and HEAD",
        long_about = "This command shows unstaged changes, or with --cached the changes staged for the next commit."
    )]
    Diff {
        #[arg(long, visible_alias = "staged", help = "Compare the index with HEAD")]
        cached: bool,
    },
    #[command(name = "log", about = "Show commit history")]
    Log {
        #[arg(long, help = "One line per commit")]
        oneline: bool,
        #[arg(short = 'p', long, help = "Show the changes each commit introduces")]
        patch: bool,
        #[arg(help = "Revisions or ranges such as main..topic")]
        revisions: Vec<String>,
        #[arg(last = true, help = "Only commits touching these paths")]
        paths: Vec<PathBuf>,
    },
    #[command(
        name = "branch",
        about = "Create, list or delete branches",
        subcommand_required = true
    )]
    Branch {
        #[command(subcommand)]
        command: BranchCommands,
    },
    #[command(
        name = "checkout",
        about = "Switch branches or detach HEAD at a commit",
        long_about = "This command updates the index and working tree to match the target and moves HEAD. \
        Local changes that would be overwritten abort the checkout unless --force is given."
    )]
    Checkout {
        #[arg(short, long, help = "Discard local changes that stand in the way")]
        force: bool,
        target: String,
    },
    #[command(name = "reset", about = "Reset HEAD, the index and optionally the workspace")]
    Reset {
        #[command(flatten)]
        mode: ResetArgs,
        revision: Option<String>,
        #[arg(last = true)]
        paths: Vec<String>,
    },
    #[command(
        name = "merge",
        about = "Join another history into the current branch",
        long_about = "This command merges the given revision into HEAD, fast-forwarding when possible. \
        A merge stopped by conflicts is finished with --continue or undone with --abort."
    )]
    Merge {
        #[arg(required_unless_present_any = ["continue_", "abort"])]
        revision: Option<String>,
        #[arg(short, long, help = "The merge commit message")]
        message: Option<String>,
        #[arg(long, help = "Merge histories without a common ancestor")]
        allow_unrelated_histories: bool,
        #[arg(long = "continue", conflicts_with = "abort")]
        continue_: bool,
        #[arg(long)]
        abort: bool,
    },
    #[command(name = "cherry-pick", about = "Apply the changes introduced by existing commits")]
    CherryPick {
        #[command(flatten)]
        sequence: SequenceArgs,
    },
    #[command(name = "revert", about = "Commit the inverse of existing commits")]
    Revert {
        #[command(flatten)]
        sequence: SequenceArgs,
    },
    #[command(
        name = "config",
        about = "Get and set repository options",
        long_about = "This command reads or writes keys such as user.name, transfer.unpack_limit \
        or remote.origin.url in .git/config.toml."
    )]
    Config {
        #[arg(long, conflicts_with_all = ["list", "value"])]
        unset: bool,
        #[arg(short, long, conflicts_with = "key")]
        list: bool,
        #[arg(required_unless_present = "list")]
        key: Option<String>,
        value: Option<String>,
    },
    #[command(name = "remote", about = "Manage the set of tracked repositories")]
    Remote {
        #[arg(short, long, help = "Show remote urls")]
        verbose: bool,
        #[command(subcommand)]
        command: Option<RemoteCommands>,
    },
    #[command(name = "fetch", about = "Download objects and refs from another repository")]
    Fetch {
        #[arg(short, long, help = "Allow non-fast-forward updates of local refs")]
        force: bool,
        remote: Option<String>,
        #[arg(help = "Refspecs to fetch instead of the remote's configured one")]
        refspecs: Vec<String>,
    },
    #[command(
        name = "push",
        about = "Update a remote ref along with its objects",
        long_about = "This command sends the current branch, or the given refspec, to the remote. \
        Updates that are not fast-forwards are refused unless --force is given."
    )]
    Push {
        #[arg(short, long, help = "Allow non-fast-forward updates")]
        force: bool,
        remote: Option<String>,
        refspec: Option<String>,
    },
    #[command(
        name = "cat-file",
        about = "Print the content of an object",
        long_about = "This command prints the content, type or size of an object in the repository, \
        or checks that it exists."
    )]
    CatFile {
        #[command(flatten)]
        mode: CatFileArgs,
        object: String,
    },
    #[command(
        name = "hash-object",
        about = "Hash an object and optionally write it to the object database",
        long_about = "This command hashes an object file and can write it to the object database. \
        It requires the path to the file to be specified."
    )]
    HashObject {
        #[arg(short, long, required = false, help = "Write the object to the object database")]
        write: bool,
        #[arg(index = 1)]
        file: String,
    },
    #[command(name = "ls-tree", about = "List the contents of a tree object")]
    LsTree {
        #[arg(short, help = "Recurse into subtrees")]
        recursive: bool,
        revision: String,
    },
    #[command(name = "merge-base", about = "Find the best common ancestor of two commits")]
    MergeBase {
        #[arg(long, help = "Print every best common ancestor")]
        all: bool,
        left: String,
        right: String,
    },
    #[command(
        name = "upload-pack",
        about = "Serve a fetch over stdin and stdout",
        hide = true
    )]
    UploadPack { path: PathBuf },
    #[command(
        name = "receive-pack",
        about = "Serve a push over stdin and stdout",
        hide = true
    )]
    ReceivePack { path: PathBuf },
}

#[derive(Subcommand)]
enum BranchCommands {
    #[command(name = "create", about = "Create a branch at HEAD or a start point")]
    Create {
        name: String,
        start_point: Option<String>,
    },
    #[command(name = "list", about = "List local branches")]
    List {
        #[arg(short, long)]
        verbose: bool,
    },
    #[command(name = "delete", about = "Delete branches")]
    Delete {
        #[arg(short, long, help = "Delete even if not merged")]
        force: bool,
        #[arg(required = true)]
        names: Vec<String>,
    },
}

#[derive(Subcommand)]
enum RemoteCommands {
    #[command(name = "add")]
    Add { name: String, url: String },
    #[command(name = "remove", visible_alias = "rm")]
    Remove { name: String },
}

#[derive(Args)]
#[group(multiple = false)]
struct ResetArgs {
    #[arg(long)]
    soft: bool,
    #[arg(long)]
    mixed: bool,
    #[arg(long)]
    hard: bool,
}

impl ResetArgs {
    fn mode(&self) -> ResetMode {
        match (self.soft, self.hard) {
            (true, _) => ResetMode::Soft,
            (_, true) => ResetMode::Hard,
            _ => ResetMode::Mixed,
        }
    }
}

#[derive(Args)]
struct SequenceArgs {
    #[arg(required_unless_present_any = ["continue_", "abort", "quit"])]
    revisions: Vec<String>,
    #[arg(short, long, help = "Parent number of a merge commit to diff against")]
    mainline: Option<usize>,
    #[arg(long = "continue", conflicts_with_all = ["abort", "quit"])]
    continue_: bool,
    #[arg(long, conflicts_with = "quit")]
    abort: bool,
    #[arg(long)]
    quit: bool,
}

#[derive(Args)]
#[group(multiple = false)]
struct CatFileArgs {
    #[arg(short = 't', help = "Print the object type")]
    kind: bool,
    #[arg(short = 's', help = "Print the object size")]
    size: bool,
    #[arg(short = 'e', help = "Exit with zero status if the object exists")]
    exists: bool,
    #[arg(short = 'p', help = "Pretty-print the object content")]
    pretty: bool,
}

impl CatFileArgs {
    fn mode(&self) -> CatFileMode {
        if self.kind {
            CatFileMode::Type
        } else if self.size {
            CatFileMode::Size
        } else if self.exists {
            CatFileMode::Exists
        } else {
            CatFileMode::Pretty
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            match RepoError::from_anyhow(&error) {
                Some(RepoError::NonFastForward(_)) => {
                    eprintln!("error: failed to push some refs");
                    eprintln!("hint: Updates were rejected because the tip of your current branch is behind");
                    eprintln!("hint: its remote counterpart. Fetch and merge the remote changes before pushing again.");
                }
                _ => eprintln!("error: {:#}", error),
            }
            ExitCode::FAILURE
        }
    }
}

fn open(path: &Path) -> Result<Repository> {
    Repository::new(path, Box::new(std::io::stdout()))
}

/// A repository at `path` that must already exist; protocol servers talk on
/// stdout, so their own output goes to stderr.
fn open_server(path: &Path) -> Result<Repository> {
    let missing = || {
        RepoError::NotFound(format!(
            "'{}' does not appear to be a git repository",
            path.display()
        ))
    };
    if !path.is_dir() {
        anyhow::bail!(missing());
    }

    let repository = Repository::new(path, Box::new(std::io::stderr()))?;
    if !repository.is_initialized() {
        anyhow::bail!(missing());
    }
    Ok(repository)
}

async fn run(cli: Cli) -> Result<()> {
    let pwd = std::env::current_dir()?;

    match cli.command {
        Commands::Init { path } => {
            let path = path.map(PathBuf::from).unwrap_or_else(|| pwd.clone());
            open(&path)?.init().await
        }
        Commands::Add { paths } => open(&pwd)?.add(&paths).await,
        Commands::Rm { cached, paths } => open(&pwd)?.rm(&paths, cached).await,
        Commands::Commit { message } => open(&pwd)?.commit(message.as_deref()).await,
        Commands::Status { porcelain } => open(&pwd)?.show_status(porcelain).await,
        Commands::Diff { cached } => open(&pwd)?.diff(cached).await,
        Commands::Log {
            oneline,
            patch,
            revisions,
            paths,
        } => {
            let options = LogOptions {
                oneline,
                patch,
                revisions,
                paths,
            };
            open(&pwd)?.log(&options).await
        }
        Commands::Branch { command } => {
            let mut repository = open(&pwd)?;
            match command {
                BranchCommands::Create { name, start_point } => {
                    repository.branch_create(&name, start_point.as_deref()).await
                }
                BranchCommands::List { verbose } => repository.branch_list(verbose).await,
                BranchCommands::Delete { force, names } => {
                    repository.branch_delete(&names, force).await
                }
            }
        }
        Commands::Checkout { force, target } => open(&pwd)?.checkout(&target, force).await,
        Commands::Reset {
            mode,
            revision,
            paths,
        } => {
            open(&pwd)?
                .reset(mode.mode(), revision.as_deref(), &paths)
                .await
        }
        Commands::Merge {
            revision,
            message,
            allow_unrelated_histories,
            continue_,
            abort,
        } => {
            let mut repository = open(&pwd)?;
            match (continue_, abort, revision) {
                (true, _, _) => repository.merge_continue().await,
                (_, true, _) => repository.merge_abort().await,
                (_, _, Some(revision)) => {
                    repository
                        .merge(&revision, message.as_deref(), allow_unrelated_histories)
                        .await
                }
                (_, _, None) => anyhow::bail!("nothing to merge"),
            }
        }
        Commands::CherryPick { sequence } => {
            let mut repository = open(&pwd)?;
            match sequence {
                SequenceArgs { continue_: true, .. } => repository.sequencer_continue().await,
                SequenceArgs { abort: true, .. } => repository.sequencer_abort().await,
                SequenceArgs { quit: true, .. } => repository.sequencer_quit().await,
                SequenceArgs {
                    revisions, mainline, ..
                } => repository.cherry_pick(&revisions, mainline).await,
            }
        }
        Commands::Revert { sequence } => {
            let mut repository = open(&pwd)?;
            match sequence {
                SequenceArgs { continue_: true, .. } => repository.sequencer_continue().await,
                SequenceArgs { abort: true, .. } => repository.sequencer_abort().await,
                SequenceArgs { quit: true, .. } => repository.sequencer_quit().await,
                SequenceArgs {
                    revisions, mainline, ..
                } => repository.revert(&revisions, mainline).await,
            }
        }
        Commands::Config {
            unset,
            list,
            key,
            value,
        } => {
            let mut repository = open(&pwd)?;
            match (list, key, value) {
                (true, _, _) => repository.config_list().await,
                (_, Some(key), _) if unset => repository.config_unset(&key).await,
                (_, Some(key), Some(value)) => repository.config_set(&key, &value).await,
                (_, Some(key), None) => repository.config_get(&key).await,
                (_, None, _) => anyhow::bail!("no key given"),
            }
        }
        Commands::Remote { verbose, command } => {
            let mut repository = open(&pwd)?;
            match command {
                Some(RemoteCommands::Add { name, url }) => repository.remote_add(&name, &url).await,
                Some(RemoteCommands::Remove { name }) => repository.remote_remove(&name).await,
                None => repository.remote_list(verbose).await,
            }
        }
        Commands::Fetch {
            force,
            remote,
            refspecs,
        } => {
            open(&pwd)?
                .fetch(remote.as_deref(), &refspecs, force)
                .await
        }
        Commands::Push {
            force,
            remote,
            refspec,
        } => {
            open(&pwd)?
                .push(remote.as_deref(), refspec.as_deref(), force)
                .await
        }
        Commands::CatFile { mode, object } => open(&pwd)?.cat_file(&object, mode.mode()).await,
        Commands::HashObject { write, file } => open(&pwd)?.hash_object(&file, write).await,
        Commands::LsTree {
            recursive,
            revision,
        } => open(&pwd)?.ls_tree(&revision, recursive).await,
        Commands::MergeBase { all, left, right } => {
            open(&pwd)?.merge_base(&left, &right, all).await
        }
        Commands::UploadPack { path } => {
            open_server(&path)?
                .upload_pack(tokio::io::stdin(), tokio::io::stdout())
                .await
        }
        Commands::ReceivePack { path } => {
            open_server(&path)?
                .receive_pack(tokio::io::stdin(), tokio::io::stdout())
                .await
        }
    }
}
