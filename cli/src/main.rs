//! Tempwatch CLI
//!
//! Command-line interface for the Tempwatch library.
//! Provides an interactive shell for loading monitoring series and running
//! filtering, spike detection and stratification on them.

use std::process;

use clap::{Arg, ArgAction, Command};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tempwatch_lib::{
    io,
    spectral::{
        autocorrelation, default_max_lag, power_spectrum, residual_spectrum, PeriodicComponent,
        DIURNAL_LAG_HOURS, WEEKLY_LAG_HOURS,
    },
    spikes::SpikeSummary,
    AnalysisConfig, AnalysisSession, FilterMode, Series,
};

/// Number of spectral peaks listed when no count is given
const DEFAULT_PEAK_COUNT: usize = 5;

/// Application state
struct AppState {
    session: AnalysisSession,
    files: Vec<(String, String)>,
}

impl AppState {
    fn new(session: AnalysisSession) -> Self {
        Self {
            session,
            files: Vec::new(),
        }
    }

    fn load(&mut self, location: &str, filename: &str) {
        println!("Loading {} from {}", location, filename);
        match io::load_csv(filename, location) {
            Ok(series) => {
                println!("Loaded {} samples", series.len());
                if let (Some(first), Some(last)) = (series.first(), series.last()) {
                    println!("  From {} to {}", first.timestamp, last.timestamp);
                }
                self.session.load_series(series);
                self.files.retain(|(loc, _)| loc != location);
                self.files.push((location.to_string(), filename.to_string()));
            }
            Err(e) => {
                log::warn!("failed to load {} for {}: {}", filename, location, e);
                println!("Error loading file: {}", e);
            }
        }
    }
}

/// Print the help message showing available commands
fn print_help() {
    println!("Available commands:");
    println!("  load <location> <filename>         - Load a timestamp,value CSV for a location");
    println!("  schedule <filename>                - Load a label,start,end schedule CSV");
    println!("  config                             - Show current analysis configuration");
    println!("  set <parameter> <value>            - Change a configuration parameter");
    println!("  locations                          - List loaded locations");
    println!("  analyze [location]                 - Filter and detect spikes (all locations if omitted)");
    println!("  spikes <location> [json]           - Show detected spikes");
    println!("  spectrum <location> [n]            - Show the n strongest spectral peaks,");
    println!("                                       autocorrelation at 24 h and 168 h, and");
    println!("                                       the share of power removed by the filter");
    println!("  stratify [<a> <b>] [json]          - Compare two locations (configured pairs if omitted)");
    println!("  relations                          - Relate detected spikes to the schedule");
    println!("  status                             - Show session status");
    println!("  help                               - Show this help message");
    println!("  quit                               - Exit the program");
    println!();
    println!("Parameters:");
    println!("  up_threshold, up_relax, down_threshold, down_relax   - Spike thresholds in °C");
    println!("  filter <none|diurnal|seasonal|both>                 - Components removed before detection");
    println!("  tolerance <seconds>                                 - Stratification matching tolerance");
    println!("  harmonics <count>                                   - Diurnal harmonics above 1 cycle/day");
    println!("  seasonal_cutoff <days>                              - Seasonal band period cutoff");
    println!("  max_gap <seconds|none>                              - Close spikes across data gaps");
    println!();
    println!("Examples:");
    println!("  load surface surface.csv");
    println!("  load bottom bottom.csv");
    println!("  set filter both");
    println!("  set up_threshold 0.8");
    println!("  analyze");
    println!("  spikes surface");
    println!("  spectrum surface 3");
    println!("  stratify surface bottom");
}

fn print_config(config: &AnalysisConfig) {
    let t = &config.spikes.thresholds;
    println!("Current Analysis Configuration:");
    println!("  Up threshold: {} (relax {})", t.up_threshold, t.up_relax);
    println!("  Down threshold: {} (relax {})", t.down_threshold, t.down_relax);
    if let Some(inner) = &config.spikes.inner {
        println!(
            "  Inner thresholds: up {} / {}, down {} / {}",
            inner.up_threshold, inner.up_relax, inner.down_threshold, inner.down_relax
        );
    }
    match config.spikes.max_gap_secs {
        Some(secs) => println!("  Max gap: {}s", secs),
        None => println!("  Max gap: none"),
    }
    println!("  Filter mode: {}", config.filter_mode);
    println!(
        "  Diurnal band: {} harmonics, ±{} cycles/day",
        config.spectral.diurnal_harmonics, config.spectral.diurnal_tolerance_cpd
    );
    println!("  Seasonal cutoff: {} days", config.spectral.seasonal_cutoff_days);
    println!("  Resample irregular input: {}", config.spectral.resample);
    println!(
        "  Stratification tolerance: {}s",
        config.stratification_tolerance_secs
    );
    for (a, b) in &config.location_pairs {
        println!("  Pair: {} - {}", a, b);
    }
}

/// Apply one `set` parameter to a copy of the configuration
fn apply_setting(config: &mut AnalysisConfig, param: &str, value: &str) -> Result<(), String> {
    let parse_f64 = |v: &str| {
        v.parse::<f64>()
            .map_err(|_| format!("Invalid number for {}: {}", param, v))
    };

    match param {
        "up_threshold" => config.spikes.thresholds.up_threshold = parse_f64(value)?,
        "up_relax" => config.spikes.thresholds.up_relax = parse_f64(value)?,
        "down_threshold" => config.spikes.thresholds.down_threshold = parse_f64(value)?,
        "down_relax" => config.spikes.thresholds.down_relax = parse_f64(value)?,
        "filter" => config.filter_mode = value.parse::<FilterMode>().map_err(|e| e.to_string())?,
        "tolerance" => {
            config.stratification_tolerance_secs = value
                .parse::<i64>()
                .map_err(|_| format!("Invalid tolerance: {}", value))?
        }
        "harmonics" => {
            config.spectral.diurnal_harmonics = value
                .parse::<usize>()
                .map_err(|_| format!("Invalid harmonic count: {}", value))?
        }
        "seasonal_cutoff" => config.spectral.seasonal_cutoff_days = parse_f64(value)?,
        "max_gap" => {
            config.spikes.max_gap_secs = match value {
                "none" | "off" => None,
                v => Some(
                    v.parse::<u64>()
                        .map_err(|_| format!("Invalid max gap: {}", v))?,
                ),
            }
        }
        _ => return Err(format!("Unknown parameter: {}", param)),
    }
    Ok(())
}

/// Split a `LOCATION=FILE` startup argument
fn parse_location_arg(arg: &str) -> Option<(&str, &str)> {
    let (location, file) = arg.split_once('=')?;
    if location.is_empty() || file.is_empty() {
        return None;
    }
    Some((location, file))
}

fn print_spikes(state: &AppState, location: &str, as_json: bool) {
    let Some(analysis) = state.session.analysis(location) else {
        println!("No analysis for '{}'. Run 'analyze {}' first.", location, location);
        return;
    };

    if as_json {
        match serde_json::to_string_pretty(&analysis.spikes) {
            Ok(json) => println!("{}", json),
            Err(e) => println!("Error serializing spikes: {}", e),
        }
        return;
    }

    println!("Spikes at {} ({} filter):", location, analysis.filter.mode);
    for (i, spike) in analysis.spikes.iter().enumerate() {
        println!("  [{}] {}", i, spike);
        for inner in &spike.inner_spikes {
            println!("        inner: {}", inner);
        }
    }
    println!("{}", SpikeSummary::from_events(&analysis.spikes));
}

fn print_autocorrelation(state: &AppState, series: &Series) {
    let max_lag = default_max_lag(series.len());
    let acf = match autocorrelation(series, max_lag, &state.session.config().spectral) {
        Ok(acf) => acf,
        Err(e) => {
            println!("Error computing autocorrelation: {}", e);
            return;
        }
    };

    println!(
        "  Autocorrelation over {} lags of {:.2} h:",
        acf.max_lag(),
        acf.step_hours
    );
    for hours in [DIURNAL_LAG_HOURS, WEEKLY_LAG_HOURS] {
        match acf.at_hours(hours) {
            Some(r) => println!("    {:>5.0} h: {:.3}", hours, r),
            None => println!("    {:>5.0} h: beyond lag range", hours),
        }
    }
}

/// Compare what the last analysis filtered out with the raw spectrum
fn print_residual_spectrum(state: &AppState, location: &str, series: &Series) {
    let Some(analysis) = state.session.analysis(location) else {
        return;
    };
    if analysis.filter.mode == FilterMode::None {
        return;
    }

    let config = &state.session.config().spectral;
    let residual = match residual_spectrum(series, analysis.analyzed_series(), config) {
        Ok(residual) => residual,
        Err(e) => {
            println!("Error computing residual spectrum: {}", e);
            return;
        }
    };

    println!("  Power removed by '{}' filtering:", analysis.filter.mode);
    let bands = [
        ("diurnal (0.9-1.1 cycles/day)", 0.9, 1.1),
        ("seasonal (below cutoff)", 0.0, config.seasonal_cutoff_cpd()),
    ];
    for (name, low, high) in bands {
        match residual.removed_fraction(low, high) {
            Some(fraction) => println!("    {}: {:.1}%", name, fraction * 100.0),
            None => println!("    {}: no power in band", name),
        }
    }
}

/// Process a user command
fn process_command(command: &str, state: &mut AppState) {
    let parts: Vec<&str> = command.split_whitespace().collect();

    if parts.is_empty() {
        return;
    }
    log::debug!("command: {}", command);

    match parts[0] {
        "load" => {
            if parts.len() != 3 {
                println!("Usage: load <location> <filename>");
                return;
            }
            state.load(parts[1], parts[2]);
        }

        "schedule" => {
            if parts.len() != 2 {
                println!("Usage: schedule <filename>");
                return;
            }

            match io::load_schedule_csv(parts[1]) {
                Ok(intervals) => {
                    println!("Loaded {} schedule intervals", intervals.len());
                    state.session.set_schedule(intervals);
                }
                Err(e) => println!("Error loading schedule: {}", e),
            }
        }

        "config" => print_config(state.session.config()),

        "set" => {
            if parts.len() < 3 {
                println!("Usage: set <parameter> <value>");
                println!("Parameters: up_threshold, up_relax, down_threshold, down_relax, filter, tolerance, harmonics, seasonal_cutoff, max_gap");
                return;
            }

            let mut config = state.session.config().clone();
            if let Err(e) = apply_setting(&mut config, parts[1], parts[2]) {
                println!("{}", e);
                return;
            }
            match state.session.set_config(config) {
                Ok(()) => println!("{} set to {}", parts[1], parts[2]),
                Err(e) => println!("Error setting {}: {}", parts[1], e),
            }
        }

        "locations" => {
            if !state.session.has_series() {
                println!("No locations loaded");
                return;
            }
            for location in state.session.locations() {
                if let Some(series) = state.session.series(location) {
                    let analyzed = if state.session.analysis(location).is_some() {
                        "analyzed"
                    } else {
                        "not analyzed"
                    };
                    println!("  {:<16} {:>8} samples  ({})", location, series.len(), analyzed);
                }
            }
        }

        "analyze" => match parts.get(1) {
            Some(location) => match state.session.analyze_location(location) {
                Ok(analysis) => {
                    println!("Analysis of {} complete", location);
                    if analysis.filter.resampled {
                        println!("  Input was resampled onto a uniform grid for filtering");
                    }
                    for component in [PeriodicComponent::Diurnal, PeriodicComponent::Seasonal] {
                        if analysis.filter.component(component).is_some() {
                            println!("  Removed {} component", component);
                        }
                    }
                    println!("{}", SpikeSummary::from_events(&analysis.spikes));
                }
                Err(e) => println!("Error analyzing {}: {}", location, e),
            },
            None => {
                if !state.session.has_series() {
                    println!("No locations loaded. Use 'load <location> <filename>' first.");
                    return;
                }
                let failures = state.session.analyze_all();
                for (location, e) in &failures {
                    println!("Error analyzing {}: {}", location, e);
                }
                let locations: Vec<String> =
                    state.session.locations().map(str::to_string).collect();
                for location in &locations {
                    if let Some(analysis) = state.session.analysis(location) {
                        println!("{}: {}", location, SpikeSummary::from_events(&analysis.spikes));
                    }
                }
            }
        },

        "spikes" => {
            if parts.len() < 2 {
                println!("Usage: spikes <location> [json]");
                return;
            }
            print_spikes(state, parts[1], parts.get(2) == Some(&"json"));
        }

        "spectrum" => {
            if parts.len() < 2 {
                println!("Usage: spectrum <location> [n]");
                return;
            }

            let count = match parts.get(2) {
                Some(n) => match n.parse::<usize>() {
                    Ok(n) => n,
                    Err(_) => {
                        println!("Invalid peak count: {}", n);
                        return;
                    }
                },
                None => DEFAULT_PEAK_COUNT,
            };

            let Some(series) = state.session.series(parts[1]) else {
                println!("No series loaded for '{}'", parts[1]);
                return;
            };

            match power_spectrum(series, &state.session.config().spectral) {
                Ok(spectrum) => {
                    println!(
                        "Power spectrum of {}: {} points, resolution {:.4} cycles/day",
                        parts[1],
                        spectrum.num_points,
                        spectrum.resolution_cpd()
                    );
                    for peak in spectrum.dominant_peaks(count) {
                        println!("  {}", peak);
                    }
                    println!(
                        "  Diurnal band (0.9-1.1 cycles/day) power: {:.4}",
                        spectrum.band_power(0.9, 1.1)
                    );
                }
                Err(e) => {
                    println!("Error computing spectrum: {}", e);
                    return;
                }
            }

            print_autocorrelation(state, series);
            print_residual_spectrum(state, parts[1], series);
        }

        "stratify" => {
            let as_json = parts.last() == Some(&"json");
            let args: Vec<&str> = parts[1..]
                .iter()
                .copied()
                .filter(|p| *p != "json")
                .collect();

            let records = match args.as_slice() {
                [a, b] => match state.session.stratify(a, b) {
                    Ok(record) => vec![record],
                    Err(e) => {
                        println!("Error: {}", e);
                        return;
                    }
                },
                [] => state.session.stratify_configured_pairs(),
                _ => {
                    println!("Usage: stratify [<a> <b>] [json]");
                    return;
                }
            };

            if records.is_empty() {
                println!("No location pairs to compare");
                return;
            }

            if as_json {
                match serde_json::to_string_pretty(&records) {
                    Ok(json) => println!("{}", json),
                    Err(e) => println!("Error serializing records: {}", e),
                }
            } else {
                for record in &records {
                    println!("{}", record);
                }
            }
        }

        "relations" => {
            if state.session.schedule().is_empty() {
                println!("No schedule loaded. Use 'schedule <filename>' first.");
                return;
            }

            let relations = state.session.relate_schedule();
            if relations.is_empty() {
                println!("No analyzed spikes to relate. Run 'analyze' first.");
                return;
            }
            for relation in relations {
                let labels = if relation.labels.is_empty() {
                    "-".to_string()
                } else {
                    relation.labels.join(", ")
                };
                println!(
                    "  {} #{} {} {} .. {}: {}",
                    relation.location,
                    relation.spike_index,
                    relation.direction,
                    relation.start,
                    relation.end,
                    labels
                );
            }
        }

        "status" => {
            println!("Session Status:");
            println!(
                "  Series loaded: {}",
                if state.session.has_series() { "Yes" } else { "No" }
            );
            println!(
                "  Analysis: {}",
                if state.session.has_analysis() { "Yes" } else { "No" }
            );
            println!("  Filter mode: {}", state.session.config().filter_mode);
            println!("  Schedule intervals: {}", state.session.schedule().len());
            for (location, file) in &state.files {
                println!("  {}: {}", location, file);
            }
        }

        "help" => print_help(),

        "quit" | "exit" => {
            println!("Goodbye!");
            process::exit(0);
        }

        _ => {
            println!("Unknown command: '{}'", parts[0]);
            println!("Type 'help' for available commands");
        }
    }
}

fn main() {
    // Parse command line arguments
    let matches = Command::new("Tempwatch")
        .version(tempwatch_lib::VERSION)
        .about("Temperature spike, periodic filtering and stratification analysis")
        .arg(
            Arg::new("series")
                .help("Series to load on startup, as LOCATION=FILE")
                .value_name("LOCATION=FILE")
                .action(ArgAction::Append)
                .num_args(1..)
                .index(1),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("JSON analysis configuration file")
                .value_name("FILE"),
        )
        .arg(
            Arg::new("filter")
                .long("filter")
                .short('f')
                .help("Set filter mode (none, diurnal, seasonal, both)")
                .value_name("MODE"),
        )
        .get_matches();

    println!("Tempwatch v{}", tempwatch_lib::VERSION);
    println!("Type 'help' for available commands\n");

    // Initialize the library
    tempwatch_lib::init();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => match AnalysisConfig::load(path) {
            Ok(config) => {
                println!("Loaded configuration from {}", path);
                config
            }
            Err(e) => {
                eprintln!("Error loading configuration: {}", e);
                process::exit(1);
            }
        },
        None => AnalysisConfig::default(),
    };

    if let Some(mode) = matches.get_one::<String>("filter") {
        match mode.parse::<FilterMode>() {
            Ok(mode) => {
                config.filter_mode = mode;
                println!("Set filter mode to {}", mode);
            }
            Err(e) => eprintln!("{}", e),
        }
    }

    let session = match AnalysisSession::with_config(config) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };
    let mut state = AppState::new(session);

    // Load series from command line if provided
    if let Some(args) = matches.get_many::<String>("series") {
        for arg in args {
            match parse_location_arg(arg) {
                Some((location, file)) => state.load(location, file),
                None => eprintln!("Expected LOCATION=FILE, got '{}'", arg),
            }
        }
    }

    // Setup readline
    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Failed to create readline: {}", e);
            process::exit(1);
        }
    };

    // Main command loop
    loop {
        let readline = rl.readline("tempwatch> ");
        match readline {
            Ok(line) => {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    rl.add_history_entry(trimmed).ok();
                    process_command(trimmed, &mut state);
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                log::error!("readline failed: {:?}", err);
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    println!("Goodbye!");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_location_arg() {
        assert_eq!(
            parse_location_arg("surface=data/surface.csv"),
            Some(("surface", "data/surface.csv"))
        );
        assert_eq!(parse_location_arg("surface"), None);
        assert_eq!(parse_location_arg("=file.csv"), None);
        assert_eq!(parse_location_arg("surface="), None);
    }

    #[test]
    fn test_apply_setting() {
        let mut config = AnalysisConfig::default();

        apply_setting(&mut config, "up_threshold", "0.8").unwrap();
        apply_setting(&mut config, "filter", "both").unwrap();
        apply_setting(&mut config, "tolerance", "120").unwrap();
        apply_setting(&mut config, "max_gap", "3600").unwrap();
        assert_eq!(config.spikes.thresholds.up_threshold, 0.8);
        assert_eq!(config.filter_mode, FilterMode::Both);
        assert_eq!(config.stratification_tolerance_secs, 120);
        assert_eq!(config.spikes.max_gap_secs, Some(3600));

        apply_setting(&mut config, "max_gap", "none").unwrap();
        assert_eq!(config.spikes.max_gap_secs, None);

        assert!(apply_setting(&mut config, "filter", "weekly").is_err());
        assert!(apply_setting(&mut config, "harmonics", "-1").is_err());
        assert!(apply_setting(&mut config, "window_size", "1024").is_err());
    }

    #[test]
    fn test_failed_load_keeps_state() {
        let mut state = AppState::new(AnalysisSession::new());
        state.load("quay", "/nonexistent/tempwatch/quay.csv");

        assert!(state.files.is_empty());
        assert!(!state.session.has_series());
    }

    #[test]
    fn test_spectrum_after_filtered_analysis() {
        let path = std::env::temp_dir().join(format!("tempwatch_cli_{}.csv", process::id()));
        let mut csv = String::from("timestamp,value\n");
        for i in 0..(10 * 24) {
            let value = 10.0 + 2.0 * (2.0 * std::f64::consts::PI * i as f64 / 24.0).sin();
            csv.push_str(&format!("2024-06-{:02} {:02}:00:00,{}\n", 1 + i / 24, i % 24, value));
        }
        std::fs::write(&path, csv).unwrap();

        let mut state = AppState::new(AnalysisSession::new());
        state.load("quay", path.to_str().unwrap());
        std::fs::remove_file(&path).unwrap();
        assert_eq!(state.session.series("quay").map(|s| s.len()), Some(240));

        process_command("set filter diurnal", &mut state);
        process_command("analyze quay", &mut state);
        let analysis = state.session.analysis("quay").unwrap();
        assert_eq!(analysis.filter.mode, FilterMode::Diurnal);

        process_command("spectrum quay 3", &mut state);
        process_command("spectrum quay x", &mut state);
        process_command("spectrum nowhere", &mut state);
        assert!(state.session.analysis("quay").is_some());
    }
}
