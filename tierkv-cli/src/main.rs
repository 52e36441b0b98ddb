use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tierkv::{
    DEFAULT_COST, DiskStore, EvictionDelegate, LoggingConfig, NamespaceRegistry, StorageConfig,
    StorageController, UNLIMITED_CAPACITY,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tierkv")]
#[command(about = "tierkv - inspect and edit a namespaced key/value store", long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory (overrides the configuration file)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Namespace to operate on (the default namespace when omitted)
    #[arg(short, long)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the value saved under KEY
    Get { key: String },
    /// Save a JSON value under KEY
    Set {
        key: String,
        value: String,
        #[arg(long, default_value_t = DEFAULT_COST)]
        cost: u64,
    },
    /// Delete KEY permanently
    Remove { key: String },
    /// Delete every key in the namespace permanently
    Clear,
    /// List the keys saved in the namespace
    Keys,
    /// Read commands from stdin against one long-lived controller
    Shell,
}

/// Logs capacity-driven evictions while the shell runs
struct EvictionReporter;

impl EvictionDelegate<String> for EvictionReporter {
    fn on_evicted(&self, controller: &StorageController<String>, key: &str, _value: &Arc<String>) {
        info!("Evicted {}:{}", controller.storage_namespace(), key);
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(args: &Args) -> Result<StorageConfig> {
    let mut config = match &args.config {
        Some(path) => StorageConfig::from_file(path)
            .with_context(|| format!("loading configuration from {:?}", path))?,
        None => StorageConfig::default(),
    };

    if let Some(data_dir) = &args.data_dir {
        config.data_dir = data_dir.clone();
    }

    Ok(config)
}

/// Values are stored as canonical JSON text so every codec can carry them
fn canonical_json(raw: &str) -> Result<String> {
    let value: serde_json::Value =
        serde_json::from_str(raw).with_context(|| format!("not valid JSON: {}", raw))?;
    Ok(value.to_string())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    init_tracing(&config.logging);
    debug!("Using data directory {:?}", config.data_dir);

    let registry: NamespaceRegistry<String> = NamespaceRegistry::from_config(&config)?;
    let storage = registry.controller_for(args.namespace.as_deref());

    match args.command {
        Command::Get { key } => match storage.get(&key)? {
            Some(value) => println!("{}", value),
            None => println!("(nil)"),
        },
        Command::Set { key, value, cost } => {
            storage.set_with_options(&key, canonical_json(&value)?, cost, true)?;
            println!("OK");
        }
        Command::Remove { key } => {
            storage.remove_permanently(&key)?;
            println!("OK");
        }
        Command::Clear => {
            storage.remove_all_permanently()?;
            println!("OK");
        }
        Command::Keys => {
            let mut keys = registry
                .disk()
                .keys(storage.storage_namespace())
                .context("listing saved keys")?;
            keys.sort();
            for key in keys {
                println!("{}", key);
            }
        }
        Command::Shell => run_shell(&storage)?,
    }

    Ok(())
}

fn run_shell(storage: &Arc<StorageController<String>>) -> Result<()> {
    let reporter = Arc::new(EvictionReporter);
    storage.set_delegate(&reporter);

    info!("Shell on namespace {}", storage.storage_namespace());

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }

        match execute(storage, line) {
            Ok(output) => writeln!(stdout, "{}", output)?,
            Err(e) => writeln!(stdout, "(error) {:#}", e)?,
        }
    }

    storage.clear_delegate();
    Ok(())
}

fn execute(storage: &StorageController<String>, line: &str) -> Result<String> {
    let mut parts = line.splitn(3, char::is_whitespace);
    let command = parts.next().unwrap_or_default().to_uppercase();
    let first = parts.next().map(str::trim);
    let rest = parts.next().map(str::trim);

    let key = || first.ok_or_else(|| anyhow!("Usage: {} key", command));

    let output = match command.as_str() {
        "GET" => match storage.get(key()?)? {
            Some(value) => value.to_string(),
            None => "(nil)".to_string(),
        },
        "SET" | "SETP" => {
            let value = rest.ok_or_else(|| anyhow!("Usage: {} key json", command))?;
            let persist = command == "SETP";
            storage.set_with_options(key()?, canonical_json(value)?, DEFAULT_COST, persist)?;
            "OK".to_string()
        }
        "SETC" => {
            // SETC key cost json
            let (cost, value) = rest
                .and_then(|r| r.split_once(char::is_whitespace))
                .ok_or_else(|| anyhow!("Usage: SETC key cost json"))?;
            let cost: u64 = cost.parse().context("cost must be an unsigned integer")?;
            storage.set_with_cost(key()?, canonical_json(value.trim())?, cost);
            "OK".to_string()
        }
        "SAVE" => {
            storage.save(key()?)?;
            "OK".to_string()
        }
        "SAVEALL" => format!("saved {}", storage.save_all()?),
        "PRELOAD" => {
            storage.preload_into_memory(key()?)?;
            "OK".to_string()
        }
        "CACHED" => match first {
            Some(key) => storage.is_cached(key).to_string(),
            None => {
                let mut keys: Vec<String> = storage.cached_keys().into_iter().collect();
                keys.sort();
                keys.join("\n")
            }
        },
        "EVICT" => {
            storage.remove_from_memory(key()?);
            "OK".to_string()
        }
        "EVICTALL" => {
            storage.remove_all_from_memory();
            "OK".to_string()
        }
        "DEL" => {
            storage.remove_permanently(key()?)?;
            "OK".to_string()
        }
        "FLUSH" => {
            storage.remove_all_permanently()?;
            "OK".to_string()
        }
        "CAP" => match first {
            Some("unlimited") => {
                storage.set_max_in_memory_capacity(UNLIMITED_CAPACITY);
                "OK".to_string()
            }
            Some(n) => {
                let capacity: u64 = n.parse().context("capacity must be an unsigned integer")?;
                storage.set_max_in_memory_capacity(capacity);
                "OK".to_string()
            }
            None => match storage.max_in_memory_capacity() {
                UNLIMITED_CAPACITY => "unlimited".to_string(),
                capacity => capacity.to_string(),
            },
        },
        "STATS" => serde_json::to_string_pretty(&storage.stats())?,
        "HELP" => HELP.to_string(),
        _ => return Err(anyhow!("Unknown command: {}", command)),
    };

    Ok(output)
}

const HELP: &str = "\
GET key              read from memory, falling back to disk
SET key json         store in memory only
SETP key json        store and save immediately
SETC key cost json   store in memory with a cost
SAVE key | SAVEALL   write resident values to disk
PRELOAD key          load a saved value into memory
CACHED [key]         residency check, or list resident keys
EVICT key | EVICTALL drop from memory only
DEL key | FLUSH      delete permanently
CAP [n|unlimited]    show or set the memory capacity
STATS                controller statistics
QUIT";

#[cfg(test)]
mod tests {
    use super::*;
    use tierkv::MemoryDiskStore;

    fn shell() -> Arc<StorageController<String>> {
        let registry: NamespaceRegistry<String> =
            NamespaceRegistry::new(Arc::new(MemoryDiskStore::new()));
        registry.default_controller()
    }

    #[test]
    fn test_canonical_json() {
        assert_eq!(canonical_json(r#"{ "a" : 1 }"#).unwrap(), r#"{"a":1}"#);
        assert!(canonical_json("not json").is_err());
    }

    #[test]
    fn test_shell_set_get_save_cycle() {
        let storage = shell();

        assert_eq!(execute(&storage, r#"SET user {"name": "ada"}"#).unwrap(), "OK");
        assert_eq!(execute(&storage, "GET user").unwrap(), r#"{"name":"ada"}"#);
        assert_eq!(execute(&storage, "SAVE user").unwrap(), "OK");
        assert_eq!(execute(&storage, "EVICTALL").unwrap(), "OK");
        assert_eq!(execute(&storage, "CACHED user").unwrap(), "false");
        assert_eq!(execute(&storage, "get user").unwrap(), r#"{"name":"ada"}"#);
    }

    #[test]
    fn test_shell_capacity_commands() {
        let storage = shell();

        assert_eq!(execute(&storage, "CAP").unwrap(), "unlimited");
        execute(&storage, "CAP 2").unwrap();
        execute(&storage, "SETC a 1 1").unwrap();
        execute(&storage, "SETC b 2 2").unwrap();

        assert_eq!(execute(&storage, "CACHED").unwrap(), "b");
        assert_eq!(execute(&storage, "CAP").unwrap(), "2");
    }

    #[test]
    fn test_shell_errors() {
        let storage = shell();

        assert!(execute(&storage, "BOGUS").is_err());
        assert!(execute(&storage, "GET").is_err());
        assert!(execute(&storage, "SET key").is_err());
        assert!(execute(&storage, "SETC key many 1").is_err());
    }
}
