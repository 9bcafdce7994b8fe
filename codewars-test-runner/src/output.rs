// Copyright (c) The codewars-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Logging and styling for standard error. Standard output carries only protocol markers.

use crate::errors::ExpectedError;
use clap::{Args, ValueEnum};
use owo_colors::{OwoColorize, Style, style};
use std::{ffi::OsStr, fmt};
use tracing::{
    Event, Level, Subscriber,
    field::{Field, Visit},
    level_filters::LevelFilter,
};
use tracing_subscriber::{
    Layer,
    filter::Targets,
    fmt::{FmtContext, FormatEvent, FormatFields, format},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// The tracing target for log lines printed without a level heading.
pub(crate) const NO_HEADING_TARGET: &str = "codewars_test_runner::no_heading";

pub(crate) mod clap_styles {
    use clap::builder::{
        Styles,
        styling::{AnsiColor, Effects, Style},
    };

    const HEADER: Style = AnsiColor::Green.on_default().effects(Effects::BOLD);
    const USAGE: Style = AnsiColor::Green.on_default().effects(Effects::BOLD);
    const LITERAL: Style = AnsiColor::Cyan.on_default().effects(Effects::BOLD);
    const PLACEHOLDER: Style = AnsiColor::Cyan.on_default();
    const ERROR: Style = AnsiColor::Red.on_default().effects(Effects::BOLD);
    const VALID: Style = AnsiColor::Cyan.on_default().effects(Effects::BOLD);
    const INVALID: Style = AnsiColor::Yellow.on_default().effects(Effects::BOLD);

    pub(crate) const fn style() -> Styles {
        Styles::styled()
            .header(HEADER)
            .usage(USAGE)
            .literal(LITERAL)
            .placeholder(PLACEHOLDER)
            .error(ERROR)
            .valid(VALID)
            .invalid(INVALID)
    }
}

#[derive(Copy, Clone, Debug, Args)]
#[must_use]
pub(crate) struct OutputOpts {
    /// Verbose output
    #[arg(long, short, global = true, env = "CODEWARS_RUNNER_VERBOSE")]
    pub(crate) verbose: bool,

    /// Produce color output on stderr: auto, always, never
    #[arg(
        long,
        value_enum,
        default_value_t,
        hide_possible_values = true,
        global = true,
        value_name = "WHEN",
        env = "CODEWARS_RUNNER_COLOR"
    )]
    pub(crate) color: Color,
}

impl OutputOpts {
    /// Sets up logging.
    ///
    /// If the log filter is invalid, logging is still set up with the default filter before the
    /// error is returned, so the error can be displayed.
    pub(crate) fn init(self) -> Result<OutputContext, ExpectedError> {
        let OutputOpts { verbose, color } = self;

        color.init(verbose)?;

        Ok(self.context())
    }

    pub(crate) fn context(self) -> OutputContext {
        OutputContext { color: self.color }
    }
}

#[derive(Copy, Clone, Debug)]
#[must_use]
pub(crate) struct OutputContext {
    pub(crate) color: Color,
}

impl OutputContext {
    /// Returns general stderr styles for the current output context.
    pub(crate) fn stderr_styles(&self) -> StderrStyles {
        let mut styles = StderrStyles::default();

        if self.color.should_colorize(supports_color::Stream::Stderr) {
            styles.colorize();
        }

        styles
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
#[must_use]
pub(crate) enum Color {
    #[default]
    Auto,
    Always,
    Never,
}

static INIT_LOGGER: std::sync::Once = std::sync::Once::new();

/// The environment variable holding the log filter, in `tracing_subscriber::filter::Targets`
/// syntax.
pub(crate) const LOG_ENV: &str = "CODEWARS_RUNNER_LOG";

/// Parses a log filter. An empty filter means the default level should be used.
fn parse_log_filter(filter: &OsStr) -> Result<Option<Targets>, ExpectedError> {
    let Some(filter) = filter.to_str() else {
        return Err(ExpectedError::LogFilterNonUtf8 {
            value: filter.to_owned(),
        });
    };
    if filter.is_empty() {
        return Ok(None);
    }
    filter
        .parse()
        .map(Some)
        .map_err(|err| ExpectedError::LogFilterParse {
            value: filter.to_owned(),
            err,
        })
}

impl Color {
    fn init(self, verbose: bool) -> Result<(), ExpectedError> {
        let mut log_styles = LogStyles::default();
        if self.should_colorize(supports_color::Stream::Stderr) {
            log_styles.colorize();
        }

        let default_level = if verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        };
        let filter = std::env::var_os(LOG_ENV).unwrap_or_default();
        let (targets, res) = match parse_log_filter(&filter) {
            Ok(Some(targets)) => (targets, Ok(())),
            Ok(None) => (Targets::new().with_default(default_level), Ok(())),
            Err(error) => (Targets::new().with_default(default_level), Err(error)),
        };

        INIT_LOGGER.call_once(|| {
            let layer = tracing_subscriber::fmt::layer()
                .event_format(SimpleFormatter { styles: log_styles })
                .with_writer(std::io::stderr)
                .with_filter(targets);

            tracing_subscriber::registry().with(layer).init();
        });

        res
    }

    pub(crate) fn should_colorize(self, stream: supports_color::Stream) -> bool {
        match self {
            Color::Auto => supports_color::on_cached(stream).is_some(),
            Color::Always => true,
            Color::Never => false,
        }
    }
}

struct SimpleFormatter {
    styles: LogStyles,
}

impl<S, N> FormatEvent<S, N> for SimpleFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();

        if metadata.target() != NO_HEADING_TARGET {
            let (heading, style) = match *metadata.level() {
                Level::ERROR => ("error", self.styles.error),
                Level::WARN => ("warning", self.styles.warning),
                Level::INFO => ("info", self.styles.info),
                Level::DEBUG => ("debug", self.styles.debug),
                Level::TRACE => ("trace", self.styles.trace),
            };
            write!(writer, "{}: ", heading.style(style))?;
        }

        let mut visitor = MessageVisitor {
            writer: &mut writer,
            error: None,
        };

        event.record(&mut visitor);

        if let Some(error) = visitor.error {
            return Err(error);
        }

        writeln!(writer)
    }
}

static MESSAGE_FIELD: &str = "message";

struct MessageVisitor<'writer, 'a> {
    writer: &'a mut format::Writer<'writer>,
    error: Option<fmt::Error>,
}

impl Visit for MessageVisitor<'_, '_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == MESSAGE_FIELD
            && let Err(error) = write!(self.writer, "{value:?}")
        {
            self.error = Some(error);
        }
    }
}

#[derive(Debug, Default)]
struct LogStyles {
    error: Style,
    warning: Style,
    info: Style,
    debug: Style,
    trace: Style,
}

impl LogStyles {
    fn colorize(&mut self) {
        self.error = style().red().bold();
        self.warning = style().yellow().bold();
        self.info = style().bold();
        self.debug = style().bold();
        self.trace = style().dimmed();
    }
}

/// Styles for messages printed to standard error.
#[derive(Debug, Default)]
pub(crate) struct StderrStyles {
    pub(crate) bold: Style,
}

impl StderrStyles {
    fn colorize(&mut self) {
        self.bold = style().bold();
    }
}
