use clap::{value_parser, Arg, ArgAction, Command};
use log::{error, info};
use simplelog::{
    format_description, ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, TermLogger,
    TerminalMode, WriteLogger,
};
use std::fs::File;
use std::path::Path;
use std::process;
use std::str::FromStr;

use run_instrument_controller::application;
use run_instrument_controller::enums::DeviceKind;

fn main() {
    // Parse the command line arguments
    let matches = Command::new("instrument controller")
        .about("Device server of the vacuum and imaging instrument.")
        .arg(
            Arg::new("device")
                .short('d')
                .long("device")
                .help("Device to serve: encoder, vacuum, or reflection")
                .required(true)
                .value_parser(["encoder", "vacuum", "reflection"]),
        )
        .arg(
            Arg::new("instance")
                .short('i')
                .long("instance")
                .help("Instance name of the device")
                .default_value("default"),
        )
        .arg(
            Arg::new("endpoint")
                .short('e')
                .long("endpoint")
                .help("Address to bind in host:port. Default depends on the device."),
        )
        .arg(
            Arg::new("simulate")
                .short('s')
                .long("simulate")
                .action(ArgAction::SetTrue)
                .help("Run the simulation mode"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config-dir")
                .help("Directory of the configuration files")
                .default_value("config"),
        )
        .arg(
            Arg::new("level")
                .short('l')
                .long("log-level")
                .help("Log level: 0 (Off), 1 (Error), 2 (Warn), 3 (Info), 4 (Debug), 5 (Trace)")
                .default_value("3")
                .value_parser(value_parser!(u32)),
        )
        .get_matches();

    // Check the device
    let device = matches
        .get_one::<String>("device")
        .expect("Device is required.");
    let kind = match DeviceKind::from_str(device) {
        Ok(kind) => kind,
        Err(_) => {
            eprintln!("Unknown device: {device}.");
            process::exit(-1);
        }
    };

    let instance = matches
        .get_one::<String>("instance")
        .expect("Instance has the default value.");
    let endpoint = matches.get_one::<String>("endpoint").map(String::as_str);
    let is_simulation_mode = matches.get_flag("simulate");
    let config_dir = matches
        .get_one::<String>("config")
        .expect("Configuration directory has the default value.");

    // Check the log filter
    let log_filter = get_log_filter(matches.get_one::<u32>("level"));

    // Initiate the logger
    initiate_logger(log_filter, &format!("{device}_{instance}.log"));
    info!("Log level: {log_filter}.");

    // Run the application
    if let Err(error) = application::run(
        kind,
        instance,
        endpoint,
        is_simulation_mode,
        Path::new(config_dir),
    ) {
        error!("Device server {instance} failed: {error}.");
        process::exit(-1);
    }
}

/// Get the log filter.
///
/// # Arguments
/// * `log_level` - Log level.
///
/// # Returns
/// Log filter.
fn get_log_filter(log_level: Option<&u32>) -> LevelFilter {
    match log_level {
        Some(level) => match level {
            0 => LevelFilter::Off,
            1 => LevelFilter::Error,
            2 => LevelFilter::Warn,
            3 => LevelFilter::Info,
            4 => LevelFilter::Debug,
            5 => LevelFilter::Trace,
            _ => LevelFilter::Info,
        },
        None => LevelFilter::Info,
    }
}

/// Initiate the logger.
///
/// # Arguments
/// * `level` - Log level.
/// * `filepath` - Log file path.
fn initiate_logger(level: LevelFilter, filepath: &str) {
    let config = ConfigBuilder::new()
        .set_time_format_custom(format_description!(
            "[year]/[month]/[day] [hour]:[minute]:[second].[subsecond]"
        ))
        .build();

    // Log to the terminal
    let logger_terminal = TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );

    // Log to the file
    match File::create(filepath) {
        Ok(file) => {
            let _ = CombinedLogger::init(vec![
                logger_terminal,
                WriteLogger::new(level, config, file),
            ]);
        }
        Err(error) => {
            eprintln!("Failed to create the log file: {error}.");
            let _ = CombinedLogger::init(vec![logger_terminal]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_log_filter() {
        assert_eq!(get_log_filter(Some(&0)), LevelFilter::Off);
        assert_eq!(get_log_filter(Some(&1)), LevelFilter::Error);
        assert_eq!(get_log_filter(Some(&2)), LevelFilter::Warn);
        assert_eq!(get_log_filter(Some(&3)), LevelFilter::Info);
        assert_eq!(get_log_filter(Some(&4)), LevelFilter::Debug);
        assert_eq!(get_log_filter(Some(&5)), LevelFilter::Trace);

        assert_eq!(get_log_filter(Some(&6)), LevelFilter::Info);

        assert_eq!(get_log_filter(None), LevelFilter::Info);
    }
}
