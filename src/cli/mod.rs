pub mod commands;
pub mod context;
pub mod output;

use clap::{Parser, Subcommand};

/// Named keys across a remote vault and a local registry. Portable
/// encrypted envelopes for your documents.
#[derive(Parser, Debug)]
#[command(name = "envault", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output (debug logging on stderr)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the envault directory (default: .envault)
    #[arg(long, global = true, env = "ENVAULT_DIR")]
    pub dir: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize envault in the current project
    Init,

    /// Create and inspect named keys
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },

    /// Encrypt a file, inline data or stdin into an envelope
    Encrypt {
        /// File to encrypt (reads stdin when omitted and --data is not given)
        file: Option<String>,
        /// Key to encrypt with
        #[arg(short, long)]
        key: String,
        /// Encrypt this text instead of a file
        #[arg(long, conflicts_with = "file")]
        data: Option<String>,
        /// Upload the envelope to document storage
        #[arg(long)]
        store: bool,
        /// Storage location code (with --store)
        #[arg(long, requires = "store")]
        location: Option<String>,
        /// Write the envelope here instead of stdout
        #[arg(short, long, conflicts_with = "store")]
        out: Option<String>,
    },

    /// Decrypt an envelope
    Decrypt {
        /// Envelope file (reads stdin when omitted)
        file: Option<String>,
        /// Key for symmetric envelopes (default: the envelope's keyName)
        #[arg(short, long)]
        key: Option<String>,
        /// Write the plaintext here instead of stdout
        #[arg(short, long)]
        out: Option<String>,
    },

    /// Fetch a stored envelope and decrypt it
    Retrieve {
        /// Stored object name, e.g. report.enc
        name: String,
        /// Key for symmetric envelopes (default: the envelope's keyName)
        #[arg(short, long)]
        key: Option<String>,
        /// Storage location code
        #[arg(long)]
        location: Option<String>,
        /// Write the plaintext here instead of stdout
        #[arg(short, long)]
        out: Option<String>,
    },

    /// List stored envelopes
    Files {
        /// Only this storage location
        #[arg(long)]
        location: Option<String>,
    },

    /// Show operation history
    Log {
        /// Filter by action (e.g. encrypt, key-create)
        #[arg(long)]
        action: Option<String>,
        /// Filter entries since this date (ISO 8601)
        #[arg(long)]
        since: Option<String>,
        /// Show last N entries
        #[arg(long)]
        last: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
pub enum KeysAction {
    /// Create a new named key
    Create {
        /// Key name (letters, digits and '-')
        name: String,
        /// Key type: AES, RSA or EC (default from config)
        #[arg(short = 't', long = "type")]
        key_type: Option<String>,
        /// Key size in bits, or curve name for EC keys
        #[arg(short, long)]
        size: Option<String>,
    },
    /// Show a key
    Get {
        /// Key name
        name: String,
        /// Print the full descriptor as JSON, including symmetric secrets
        #[arg(long)]
        json: bool,
    },
    /// List keys in the local registry
    List,
}
