//! Pacm console - command-line package manager.
//!
//! # Examples
//!
//! ```text
//! pacm --endpoint https://packages.example.com --uri /packages.json \
//!      --install surveillancemode,recordingmode --print
//! pacm --uninstall surveillancemode
//! pacm --update --print
//! ```

mod error;

use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;
use tracing::info;

use pacm::config::{InstallOptions, ManagerOptions};
use pacm::fetch::ChecksumAlgorithm;
use pacm::logging::init_logging;
use pacm::manager::PackageManager;
use pacm::package::PackageState;

use error::CliError;

// ============================================================================
// CLI Argument Definitions
// ============================================================================

#[derive(Parser)]
#[command(name = "pacm")]
#[command(version = pacm::VERSION)]
#[command(about = "Package manager for binary plugins and components", long_about = None)]
struct Cli {
    /// HTTP server endpoint
    #[arg(long)]
    endpoint: Option<String>,

    /// HTTP server package JSON index URI
    #[arg(long)]
    uri: Option<String>,

    /// Directory where packages will be installed
    #[arg(long, value_name = "DIR")]
    install_dir: Option<PathBuf>,

    /// Directory where package manifests will be stored
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Directory where intermediate package files will be stored
    #[arg(long, value_name = "DIR")]
    temp_dir: Option<PathBuf>,

    /// Packages to install (comma separated)
    #[arg(long, value_delimiter = ',', value_name = "IDS")]
    install: Vec<String>,

    /// Packages to uninstall (comma separated)
    #[arg(long, value_delimiter = ',', value_name = "IDS")]
    uninstall: Vec<String>,

    /// Update all installed packages
    #[arg(long)]
    update: bool,

    /// Print all local and remote packages on exit
    #[arg(long)]
    print: bool,

    /// Checksum algorithm for verifying packages (MD5/SHA1)
    #[arg(long, value_name = "ALG")]
    checksum_alg: Option<String>,

    /// Log file path
    #[arg(long, value_name = "FILE")]
    logfile: Option<PathBuf>,
}

impl Cli {
    fn manager_options(&self) -> Result<ManagerOptions, CliError> {
        let mut options = ManagerOptions::default();

        if let Some(endpoint) = &self.endpoint {
            options.endpoint = endpoint.clone();
        }
        if let Some(uri) = &self.uri {
            options.index_uri = uri.clone();
        }
        if let Some(dir) = &self.install_dir {
            options.install_dir = dir.clone();
        }
        if let Some(dir) = &self.data_dir {
            options.data_dir = dir.clone();
        }
        if let Some(dir) = &self.temp_dir {
            options.temp_dir = dir.clone();
        }
        if let Some(alg) = &self.checksum_alg {
            options.checksum_algorithm =
                ChecksumAlgorithm::from_str(alg).map_err(CliError::Config)?;
        }

        Ok(options)
    }
}

// ============================================================================
// Command Flow
// ============================================================================

fn run(cli: &Cli, manager: &PackageManager) -> Result<(), CliError> {
    manager.initialize()?;
    manager.query_remote_packages()?;

    let mut failed = 0usize;

    // Uninstall packages if requested.
    if !cli.uninstall.is_empty() {
        info!(count = cli.uninstall.len(), "uninstalling packages");
        if !manager.uninstall_packages(&cli.uninstall, false)? {
            failed += 1;
        }
    }

    // Install packages if requested.
    if !cli.install.is_empty() {
        info!(count = cli.install.len(), "installing packages");
        match manager.install_packages(&cli.install, &InstallOptions::default(), None, false) {
            Ok(_) => {}
            Err(_) => failed += 1,
        }
        manager.wait_for_tasks();
        failed += count_failed(manager);
    }

    // Update all packages if requested.
    if cli.update {
        info!("updating all packages");
        if manager.update_all_packages(false).is_err() {
            failed += 1;
        }
        manager.wait_for_tasks();
        failed += count_failed(manager);
    }

    // Print packages to stdout.
    if cli.print {
        print_packages(manager);
    }

    if failed > 0 {
        return Err(CliError::PackagesFailed { failed });
    }
    Ok(())
}

/// Count local packages left in the Failed state, surfacing each last error.
fn count_failed(manager: &PackageManager) -> usize {
    let mut failed = 0;
    for package in manager.local_packages() {
        let local = package.lock().unwrap();
        if local.state() == PackageState::Failed {
            eprintln!(
                "Failed to install {}: {}",
                local.id(),
                local.last_error().unwrap_or("unknown error")
            );
            failed += 1;
        }
    }
    failed
}

fn print_packages(manager: &PackageManager) {
    let local = manager.local_packages();
    println!("Local packages: {}", local.len());
    for package in &local {
        let package = package.lock().unwrap();
        println!(
            "  - {}: version={}, state={}",
            package.id(),
            package.version(),
            package.state()
        );
    }

    let remote = manager.remote_packages();
    println!("Remote packages: {}", remote.len());
    for package in &remote {
        let version = package
            .latest_asset()
            .map(|a| a.version.clone())
            .unwrap_or_else(|_| "?".to_string());
        println!(
            "  - {}: version={}, author={}",
            package.id(),
            version,
            package.info.author
        );
    }
}

fn main() {
    let cli = Cli::parse();

    let _logging_guard = match init_logging(cli.logfile.as_deref()) {
        Ok(guard) => guard,
        Err(e) => CliError::LoggingInit(e.to_string()).exit(),
    };

    let options = match cli.manager_options() {
        Ok(options) => options,
        Err(e) => e.exit(),
    };
    let manager = PackageManager::new(options);

    if let Err(e) = run(&cli, &manager) {
        e.exit();
    }
}
