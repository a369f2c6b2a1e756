//! Terminal handling for the report stream.

use termcolor::{ColorChoice, StandardStream};

use super::args::{ColorMode, Format};

/// Resolves `--color` against the terminal. `auto` colors only when stdout is a TTY;
/// JSON is never colored.
pub fn color_choice(mode: ColorMode, format: Format) -> ColorChoice {
    if format == Format::Json {
        return ColorChoice::Never;
    }
    match mode {
        ColorMode::Always => ColorChoice::Always,
        ColorMode::Never => ColorChoice::Never,
        ColorMode::Auto if atty::is(atty::Stream::Stdout) => ColorChoice::Auto,
        ColorMode::Auto => ColorChoice::Never,
    }
}

/// The stdout stream the report is written to.
pub fn report_stream(mode: ColorMode, format: Format) -> StandardStream {
    StandardStream::stdout(color_choice(mode, format))
}
