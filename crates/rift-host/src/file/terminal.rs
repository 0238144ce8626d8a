//! Terminal capability probing for descriptors.
//!
//! Answers three questions about a descriptor: is it interactive (a tty
//! or pty), is it a real terminal (interactive with a usable window
//! size, as opposed to a pty used purely as a pipe endpoint), and does
//! its terminal type understand color escape sequences. One probe
//! answers all three; the caller caches the result.

use crate::file::resource::{descriptor_is_valid, RawDescriptor};

/// Result of probing one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TerminalTraits
{
    pub interactive: bool,
    pub real_terminal: bool,
    pub supports_colors: bool,
}

impl TerminalTraits
{
    pub(crate) const NOT_A_TERMINAL: Self = Self {
        interactive: false,
        real_terminal: false,
        supports_colors: false,
    };
}

/// Probe a descriptor for its terminal traits.
///
/// `isatty(3)` decides interactivity. A real terminal additionally needs
/// `TIOCGWINSZ` to report a non-zero width and height, so cursor motion
/// and other escape-sequence manipulation have somewhere to land. Color
/// support is judged from `TERM`.
pub(crate) fn probe(descriptor: RawDescriptor) -> TerminalTraits
{
    if !descriptor_is_valid(descriptor) {
        return TerminalTraits::NOT_A_TERMINAL;
    }
    if unsafe { libc::isatty(descriptor) } == 0 {
        return TerminalTraits::NOT_A_TERMINAL;
    }

    let mut window = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let real_terminal = unsafe { libc::ioctl(descriptor, libc::TIOCGWINSZ, &mut window) } == 0
        && window.ws_col > 0
        && window.ws_row > 0;

    let supports_colors = real_terminal
        && std::env::var("TERM")
            .map(|term| term_supports_colors(&term))
            .unwrap_or(false);

    TerminalTraits {
        interactive: true,
        real_terminal,
        supports_colors,
    }
}

/// Judge whether a `TERM` value names a color-capable terminal type.
fn term_supports_colors(term: &str) -> bool
{
    if term.contains("color") {
        return true;
    }
    const COLOR_TERMS: &[&str] = &["ansi", "cygwin", "linux"];
    const COLOR_PREFIXES: &[&str] = &["xterm", "screen", "tmux", "rxvt", "vt100"];
    COLOR_TERMS.contains(&term) || COLOR_PREFIXES.iter().any(|prefix| term.starts_with(prefix))
}
