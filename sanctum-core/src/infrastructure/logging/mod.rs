//! Logging setup using `log` + `log4rs`.
//!
//! Console output goes to stderr. When a log directory is configured, a
//! rolling file appender is added, plus a warn-and-up file unless error
//! logging is switched off. External crates are silenced unless opted in
//! via `<crate>=<level>` (or `root=<level>` for everything).

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::filter::threshold::ThresholdFilter;
use std::path::PathBuf;

const CONSOLE_APPENDER: &str = "stderr";
const LOG_FILE_APPENDER: &str = "log_file";
const ERR_LOG_FILE_APPENDER: &str = "err_log_file";

const LOG_FILE_NAME: &str = "sanctum.log";
const ERR_LOG_FILE_NAME: &str = "sanctum_err.log";
const LOG_FILE_MAX_SIZE: u64 = 16 * 1024 * 1024;
const LOG_FILE_MAX_ROLLS: u32 = 4;

const LOG_LINE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{h({l:5.5})}] {m}{n}";

const WHITELISTED_CRATES: &[&str] = &["sanctum_core", "sanctum_service"];

/// Initializes the global logger. Repeated calls are ignored.
///
/// `filters` is a comma-separated expression: a bare level sets the level
/// for the sanctum crates (`"debug"`), `<module>=<level>` opts a module
/// in, `root=<level>` opts in everything else.
pub fn init_logger(log_dir: Option<&str>, filters: &str, error_file: bool) {
    let app_level = parse_app_level(filters);
    let root_level = parse_root_override(filters).unwrap_or(LevelFilter::Off);
    let module_levels = parse_module_levels(filters);

    let console =
        ConsoleAppender::builder().target(Target::Stderr).encoder(Box::new(PatternEncoder::new(LOG_LINE_PATTERN))).build();

    let mut builder = Config::builder().appender(Appender::builder().build(CONSOLE_APPENDER, Box::new(console)));
    let mut appenders: Vec<&str> = vec![CONSOLE_APPENDER];

    if let Some(dir) = log_dir.filter(|dir| !dir.trim().is_empty()) {
        let dir = dir.trim();
        if let Some(appender) = rolling_appender(dir, LOG_FILE_NAME) {
            builder = builder.appender(Appender::builder().build(LOG_FILE_APPENDER, Box::new(appender)));
            appenders.push(LOG_FILE_APPENDER);
        }
        if error_file {
            if let Some(appender) = rolling_appender(dir, ERR_LOG_FILE_NAME) {
                builder = builder.appender(
                    Appender::builder()
                        .filter(Box::new(ThresholdFilter::new(LevelFilter::Warn)))
                        .build(ERR_LOG_FILE_APPENDER, Box::new(appender)),
                );
                appenders.push(ERR_LOG_FILE_APPENDER);
            }
        }
    }

    let appender_names: Vec<String> = appenders.iter().map(|name| (*name).to_string()).collect();

    for crate_name in WHITELISTED_CRATES {
        if !module_levels.iter().any(|(module, _)| module == *crate_name) {
            builder = builder
                .logger(Logger::builder().appenders(appender_names.clone()).additive(false).build(*crate_name, app_level));
        }
    }
    for (module, level) in &module_levels {
        builder =
            builder.logger(Logger::builder().appenders(appender_names.clone()).additive(false).build(module, *level));
    }

    let config = match builder.build(Root::builder().appenders(appenders).build(root_level)) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid logging config: {err}");
            return;
        }
    };
    let _ = log4rs::init_config(config);
}

fn rolling_appender(dir: &str, file_name: &str) -> Option<RollingFileAppender> {
    let path = PathBuf::from(dir).join(file_name);
    let archive = PathBuf::from(dir).join(format!("{file_name}.{{}}.gz"));
    let roller = FixedWindowRoller::builder().base(1).build(archive.to_str()?, LOG_FILE_MAX_ROLLS).ok()?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(LOG_FILE_MAX_SIZE)), Box::new(roller));
    RollingFileAppender::builder().encoder(Box::new(PatternEncoder::new(LOG_LINE_PATTERN))).build(path, Box::new(policy)).ok()
}

fn parse_app_level(filters: &str) -> LevelFilter {
    for part in filters.split(',') {
        let part = part.trim();
        if part.is_empty() || part.contains('=') {
            continue;
        }
        if let Ok(level) = part.parse() {
            return level;
        }
    }
    LevelFilter::Info
}

fn parse_root_override(filters: &str) -> Option<LevelFilter> {
    for part in filters.split(',') {
        let Some((module, level)) = part.trim().split_once('=') else { continue };
        if module.trim() != "root" {
            continue;
        }
        if let Ok(level) = level.trim().parse() {
            return Some(level);
        }
    }
    None
}

fn parse_module_levels(filters: &str) -> Vec<(String, LevelFilter)> {
    let mut levels = Vec::new();
    for part in filters.split(',') {
        let Some((module, level)) = part.trim().split_once('=') else { continue };
        let module = module.trim();
        if module.is_empty() || module == "root" {
            continue;
        }
        if let Ok(level) = level.trim().parse() {
            levels.push((module.to_string(), level));
        }
    }
    levels
}
