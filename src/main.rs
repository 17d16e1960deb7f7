use clap::{Parser, Subcommand};
use exn::ResultExt;
use pkgcdn::error::{ErrorKind, Result};
use pkgcdn::{PackageFiles, PackageRef};
use pkgcdn_archive::{ArchiveEntry, EntryKind};
use pkgcdn_config::Config;
use std::path::PathBuf;
use std::process::ExitCode;
use time::format_description::well_known::Rfc3339;
use tokio::io::AsyncWriteExt;

#[derive(Parser, Debug)]
#[command(name = "pkgcdn", version, about = "Serve files out of registry-hosted package tarballs")]
struct Cli {
    /// Configuration file (.toml, .yaml or .json)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a file from a package, downloading the package if needed
    Cat {
        /// name[@version or tag]
        package: PackageRef,
        /// Path inside the package; a trailing .js may be omitted
        path: String,
        /// Serve the external substitute from this solution instead
        #[arg(long)]
        switch: Option<String>,
        /// Print response headers to stderr
        #[arg(long)]
        headers: bool,
    },
    /// List a directory inside a package
    Ls {
        /// name[@version or tag]
        package: PackageRef,
        #[arg(default_value = "/")]
        path: String,
    },
    /// Print the external substitute of a file
    Switch {
        name: String,
        version: String,
        path: String,
        solution: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let files = PackageFiles::new(&config)?;
    let mut stdout = tokio::io::stdout();

    match cli.command {
        Commands::Cat { package, path, switch, headers } => {
            let resolved = files.resolve_switched(&package.name, &package.version, &path, switch.as_deref()).await?;
            if headers {
                match resolved.headers() {
                    Some(headers) => {
                        for (name, value) in headers.to_pairs() {
                            eprintln!("{name}: {value}");
                        }
                    },
                    None => eprintln!("Content-Type: {}", resolved.content_type()),
                }
            }
            resolved.copy_to(&mut stdout).await?;
        },
        Commands::Ls { package, path } => {
            let listing = files.list(&package.name, &package.version, &path).await?;
            let mut output = String::new();
            if let Some(found) = listing.found() {
                match found.kind {
                    EntryKind::File => output.push_str(&describe(found)),
                    EntryKind::Directory => {
                        for entry in listing.children(&found.name) {
                            output.push_str(&describe(entry));
                        }
                    },
                }
            }
            stdout.write_all(output.as_bytes()).await.or_raise(|| ErrorKind::Output)?;
            stdout.flush().await.or_raise(|| ErrorKind::Output)?;
        },
        Commands::Switch { name, version, path, solution } => {
            let substitute = files.switch(&name, &version, &path, &solution).await?;
            stdout.write_all(format!("{substitute}\n").as_bytes()).await.or_raise(|| ErrorKind::Output)?;
        },
    }
    Ok(())
}

/// One `ls` line: size, modification time, content type, integrity, name.
fn describe(entry: &ArchiveEntry) -> String {
    match &entry.meta {
        Some(meta) => {
            let modified = meta.last_modified.format(&Rfc3339).unwrap_or_default();
            format!(
                "{:>10}  {modified}  {:<28}  {}  {}\n",
                meta.size,
                meta.content_type,
                meta.integrity.as_str(),
                entry.name
            )
        },
        None => format!("{:>10}  {:20}  {:<28}  {:51}  {}/\n", "-", "", "directory", "", entry.name),
    }
}
