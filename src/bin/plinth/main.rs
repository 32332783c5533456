//! Operator tooling for a plinth environment.
//!
//! ```text
//! plinth --dir <env> user password [USERNAME]
//! plinth --dir <env> compactor run --full|--incremental
//! ```
//!
//! Exit codes: 0 success, 1 failure, 2 usage error.

use structopt::StructOpt;

use std::{collections::BTreeMap, ffi, fs, io::BufRead, path, process::exit};

use plinth::{store::Store, Config, Result};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[derive(StructOpt)]
#[structopt(name = "plinth", about = "plinth storage tooling")]
struct Opt {
    /// Environment directory.
    #[structopt(long, default_value = ".")]
    dir: String,

    /// Optional TOML configuration; overrides --dir.
    #[structopt(long)]
    config: Option<String>,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
enum Command {
    /// User administration.
    User(UserCommand),
    /// Compaction control.
    Compactor(CompactorCommand),
}

#[derive(StructOpt)]
enum UserCommand {
    /// Set a user's password, read from stdin.
    Password {
        /// Defaults to "admin".
        username: Option<String>,
    },
}

#[derive(StructOpt)]
enum CompactorCommand {
    /// Trigger a compaction run.
    Run {
        /// Loop shifts until a full cycle completes.
        #[structopt(long)]
        full: bool,
        /// Attempt a single non-blocking shift.
        #[structopt(long)]
        incremental: bool,
    },
}

fn main() {
    env_logger::init();

    let opt = match Opt::from_iter_safe(std::env::args()) {
        Ok(opt) => opt,
        Err(err) => {
            use structopt::clap::ErrorKind::{HelpDisplayed, VersionDisplayed};

            println!("{}", err.message);
            match err.kind {
                HelpDisplayed | VersionDisplayed => exit(0),
                _ => exit(2),
            }
        }
    };

    match run(opt) {
        Ok(()) => exit(0),
        Err(err) => {
            eprintln!("error: {}", err);
            exit(1);
        }
    }
}

fn run(opt: Opt) -> Result<()> {
    let config = match &opt.config {
        Some(loc) => Config::from_file(ffi::OsStr::new(loc))?,
        None => Config::new(ffi::OsStr::new(&opt.dir)),
    };

    match opt.command {
        Command::User(UserCommand::Password { username }) => {
            let username = username.unwrap_or_else(|| "admin".to_string());
            set_password(&config, &username)
        }
        Command::Compactor(CompactorCommand::Run { full, incremental }) => {
            run_compactor(config, full, incremental)
        }
    }
}

fn set_password(config: &Config, username: &str) -> Result<()> {
    use plinth::{err_at, Error};

    eprint!("password for {}: ", username);
    let password = {
        let mut line = String::new();
        let stdin = std::io::stdin();
        err_at!(IOError, stdin.lock().read_line(&mut line))?;
        line.trim_end().to_string()
    };
    if password.is_empty() {
        err_at!(InvalidInput, msg: "empty password")?;
    }

    let loc: path::PathBuf = [config.dir.as_str(), "users.toml"].iter().collect();
    let mut users: BTreeMap<String, String> = match fs::read_to_string(&loc) {
        Ok(text) => err_at!(InvalidFile, toml::from_str(&text))?,
        Err(_) => BTreeMap::new(),
    };

    let salt: u64 = rand::random();
    let digest = {
        let mut data = salt.to_le_bytes().to_vec();
        data.extend_from_slice(password.as_bytes());
        plinth::hash::murmur3_128(&data)?
    };
    users.insert(username.to_string(), format!("{:016x}:{:032x}", salt, digest));

    let text = err_at!(FailConvert, toml::to_string(&users))?;
    err_at!(IOError, fs::create_dir_all(&config.dir))?;
    err_at!(IOError, fs::write(&loc, text))?;

    println!("password set for {}", username);
    Ok(())
}

fn run_compactor(config: Config, full: bool, incremental: bool) -> Result<()> {
    use plinth::{err_at, Error};

    if full == incremental {
        err_at!(InvalidInput, msg: "pass exactly one of --full, --incremental")?;
    }

    let store = Store::open(config)?;
    if full {
        store.execute_full_compaction()?;
    } else {
        let ran = store.try_incremental_compaction()?;
        println!("incremental shift ran: {}", ran);
    }
    println!("{}", store.to_stats());
    store.close()
}
