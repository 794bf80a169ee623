use clap::{Arg, Command};
use flight_source::config::source_options;
use flight_source::logging::{self, LoggingConfig};
use flight_source::{
    CaseInsensitiveSettings, FlightTable, PartitionDescriptor, PartitionReadError, PartitionReader,
    PartitionReaderFactory, Settings,
};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};

struct PartitionSummary {
    index: usize,
    batches: usize,
    rows: usize,
}

fn read_partition(
    factory: &PartitionReaderFactory,
    index: usize,
    partition: PartitionDescriptor,
) -> Result<PartitionSummary, PartitionReadError> {
    let mut reader = factory.create_columnar_reader(partition)?;
    let mut summary = PartitionSummary {
        index,
        batches: 0,
        rows: 0,
    };
    let read = (|| -> Result<(), PartitionReadError> {
        while reader.next()? {
            summary.batches += 1;
            summary.rows += reader.get()?.num_rows();
        }
        Ok(())
    })();
    let closed = reader.close();
    read.and(closed).map(|()| summary)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = Command::new("flight_read")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Reads every partition of an Arrow Flight command")
        .arg(
            Arg::new("uri")
                .long("uri")
                .help("Flight server location")
                .value_name("URI")
                .default_value(flight_source::location::DEFAULT_URI),
        )
        .arg(
            Arg::new("path")
                .long("path")
                .help("Command sent to the server")
                .value_name("COMMAND")
                .required(true),
        )
        .arg(Arg::new("username").long("username").value_name("USER"))
        .arg(Arg::new("password").long("password").value_name("PASSWORD"))
        .arg(
            Arg::new("token")
                .long("token")
                .help("Bearer token sent with every call")
                .value_name("TOKEN"),
        )
        .arg(
            Arg::new("trusted-certificates")
                .long("trusted-certificates")
                .help("PEM bundle of trusted root certificates")
                .value_name("FILE"),
        )
        .arg(
            Arg::new("client-certificate")
                .long("client-certificate")
                .help("PEM client certificate for mutual TLS")
                .value_name("FILE"),
        )
        .arg(
            Arg::new("client-key")
                .long("client-key")
                .help("PEM client key for mutual TLS")
                .value_name("FILE"),
        )
        .arg(
            Arg::new("failover")
                .long("failover")
                .help("Try further endpoint locations when one is unreachable")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .help("Write logs to this file")
                .value_name("FILE"),
        )
        .arg(
            Arg::new("otlp-endpoint")
                .long("otlp-endpoint")
                .help("Export traces over OTLP/HTTP, to the local collector when no URL is given")
                .value_name("URL")
                .num_args(0..=1)
                .default_missing_value(logging::DEFAULT_TRACES_ENDPOINT),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Enable verbose logging")
                .action(clap::ArgAction::Count),
        )
        .get_matches();

    let stderr_level = match matches.get_count("verbose") {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    logging::init(
        LoggingConfig::new(
            matches.get_one::<String>("log-file").map(PathBuf::from),
            true,
            matches.get_one::<String>("otlp-endpoint").cloned(),
        )
        .with_stderr_level(stderr_level),
    )?;

    let mut settings = CaseInsensitiveSettings::new();
    for (arg, key) in [
        ("uri", source_options::URI),
        ("path", source_options::PATH),
        ("username", source_options::USERNAME),
        ("password", source_options::PASSWORD),
        ("token", source_options::TOKEN),
    ] {
        if let Some(value) = matches.get_one::<String>(arg) {
            settings.set_string(key, value.clone());
        }
    }
    for (arg, key) in [
        ("trusted-certificates", source_options::TRUSTED_CERTIFICATES),
        ("client-certificate", source_options::CLIENT_CERTIFICATE),
        ("client-key", source_options::CLIENT_KEY),
    ] {
        if let Some(file) = matches.get_one::<String>(arg) {
            settings.set_string(key, std::fs::read_to_string(file)?);
        }
    }
    if matches.get_flag("failover") {
        settings.set_string(source_options::LOCATION_POLICY, "failover".to_string());
    }

    let table = FlightTable::open_settings(&settings)?;
    info!("{}", table.description());
    println!("{}", table.schema());

    let partitions = table.plan_partitions()?;
    let factory = table.reader_factory();
    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = partitions
            .into_iter()
            .enumerate()
            .map(|(index, partition)| {
                let factory = &factory;
                scope.spawn(move || read_partition(factory, index, partition))
            })
            .collect();
        handles.into_iter().map(|handle| handle.join()).collect()
    });

    let mut failed = 0;
    let mut total_rows = 0;
    for result in results {
        match result {
            Ok(Ok(summary)) => {
                total_rows += summary.rows;
                println!(
                    "{}",
                    serde_json::json!({
                        "partition": summary.index,
                        "batches": summary.batches,
                        "rows": summary.rows,
                    })
                );
            }
            Ok(Err(err)) => {
                failed += 1;
                error!("Partition read failed: {err}");
            }
            Err(_) => {
                failed += 1;
                error!("Partition reader thread panicked");
            }
        }
    }
    info!("Read {total_rows} row(s)");
    if failed > 0 {
        return Err(format!("{failed} partition(s) failed").into());
    }
    Ok(())
}
