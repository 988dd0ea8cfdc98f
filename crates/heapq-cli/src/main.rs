use std::path::PathBuf;
use std::time::Duration;

use compact_str::CompactString;
use facet::Facet;
use figue as args;
use heapq_query::{OutputFormat, QueryConfig, query_pack, run_query};
use heapq_snapshot::{DEFAULT_ATTACH_TIMEOUT, SnapshotSource, open_snapshot};
use tracing::debug;

#[derive(Facet, Debug)]
struct Cli {
    #[facet(flatten)]
    builtins: args::FigueBuiltins,
    #[facet(args::subcommand)]
    command: Command,
}

#[derive(Facet, Debug)]
#[repr(u8)]
enum Command {
    /// Run an ad hoc query.
    Run {
        #[facet(args::named)]
        query: CompactString,
        #[facet(args::named, default)]
        dump: Option<CompactString>,
        #[facet(args::named, default)]
        url: Option<CompactString>,
        #[facet(args::named, default)]
        attach_timeout_ms: Option<u64>,
        #[facet(args::named, default)]
        format: Option<CompactString>,
        #[facet(args::named, default)]
        width: Option<u64>,
    },
    /// Run one of the built-in query packs.
    Pack {
        #[facet(args::named)]
        name: CompactString,
        #[facet(args::named, default)]
        dump: Option<CompactString>,
        #[facet(args::named, default)]
        url: Option<CompactString>,
        #[facet(args::named, default)]
        attach_timeout_ms: Option<u64>,
        #[facet(args::named, default)]
        format: Option<CompactString>,
        #[facet(args::named, default)]
        width: Option<u64>,
    },
}

/// Flags shared by every subcommand.
struct Target {
    dump: Option<CompactString>,
    url: Option<CompactString>,
    attach_timeout_ms: Option<u64>,
    format: Option<CompactString>,
    width: Option<u64>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let figue_config = args::builder::<Cli>()
        .map_err(|e| format!("failed to build CLI schema: {e}"))?
        .cli(|cli| cli.strict())
        .help(|h| {
            h.program_name("heapq")
                .description("Run ad hoc queries against heap snapshots")
                .version(option_env!("CARGO_PKG_VERSION").unwrap_or("dev"))
        })
        .build();
    let cli = args::Driver::new(figue_config)
        .run()
        .into_result()
        .map_err(|e| e.to_string())?;

    match cli.value.command {
        Command::Run {
            query,
            dump,
            url,
            attach_timeout_ms,
            format,
            width,
        } => execute(
            &query,
            Target {
                dump,
                url,
                attach_timeout_ms,
                format,
                width,
            },
        ),
        Command::Pack {
            name,
            dump,
            url,
            attach_timeout_ms,
            format,
            width,
        } => {
            let pack = query_pack(&name).map_err(|e| e.to_string())?;
            debug!(pack = pack.name, "running query pack");
            execute(
                pack.query,
                Target {
                    dump,
                    url,
                    attach_timeout_ms,
                    format,
                    width,
                },
            )
        }
    }
}

fn execute(query: &str, target: Target) -> Result<(), String> {
    let mut config = QueryConfig::from_env()?;
    match target.width {
        Some(0) => return Err("invalid --width 0: width must be at least 1".to_string()),
        Some(width) => config.table_width = width as usize,
        None => {}
    }

    // Reject an unknown format before touching the snapshot.
    let format = target.format.as_deref().unwrap_or(OutputFormat::default().name());
    format.parse::<OutputFormat>().map_err(|e| e.to_string())?;

    let source = snapshot_source(target.dump, target.url, target.attach_timeout_ms)?;
    let heap = open_snapshot(&source).map_err(|e| e.to_string())?;

    let stdout = std::io::stdout();
    let mut sink = stdout.lock();
    run_query(heap, query, format, &mut sink, &config).map_err(|e| e.to_string())?;
    Ok(())
}

fn snapshot_source(
    dump: Option<CompactString>,
    url: Option<CompactString>,
    attach_timeout_ms: Option<u64>,
) -> Result<SnapshotSource, String> {
    match (dump, url) {
        (Some(path), None) => Ok(SnapshotSource::DumpFile(PathBuf::from(path.as_str()))),
        (None, Some(endpoint)) => Ok(SnapshotSource::Live {
            endpoint: endpoint.to_string(),
            attach_timeout: attach_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_ATTACH_TIMEOUT),
        }),
        (Some(_), Some(_)) => Err("pass either --dump or --url, not both".to_string()),
        (None, None) => {
            Err("no snapshot source: pass --dump <path> or --url <endpoint>".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_source_is_required() {
        assert!(matches!(
            snapshot_source(Some("heap.json".into()), None, None),
            Ok(SnapshotSource::DumpFile(path)) if path == PathBuf::from("heap.json")
        ));
        assert!(snapshot_source(None, None, None).is_err());
        assert!(snapshot_source(Some("heap.json".into()), Some("http://x".into()), None).is_err());
    }

    #[test]
    fn live_sources_default_the_attach_timeout() {
        let Ok(SnapshotSource::Live {
            endpoint,
            attach_timeout,
        }) = snapshot_source(None, Some("http://127.0.0.1:9140/heap".into()), None)
        else {
            panic!("expected a live source");
        };
        assert_eq!(endpoint, "http://127.0.0.1:9140/heap");
        assert_eq!(attach_timeout, DEFAULT_ATTACH_TIMEOUT);

        let Ok(SnapshotSource::Live { attach_timeout, .. }) =
            snapshot_source(None, Some("http://x".into()), Some(250))
        else {
            panic!("expected a live source");
        };
        assert_eq!(attach_timeout, Duration::from_millis(250));
    }
}
