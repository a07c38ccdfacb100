// SPDX-License-Identifier: MIT

//! Diagnostic output.
//!
//! Both roles are GUI processes without a console, so formatted events go
//! to the debugger output stream (DebugView, or an attached debugger).  On
//! other hosts they go to stderr.

use std::io::{self, Write};

use tracing_subscriber::{fmt::MakeWriter, EnvFilter};

/// Level used when `RUST_LOG` is not set.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

/// Install the global subscriber.  Later calls do nothing.
pub fn init(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(DebugOutput)
        .with_ansi(false)
        .with_target(false)
        .try_init();
}

/// Writer for one formatted event.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugOutput;

impl<'a> MakeWriter<'a> for DebugOutput {
    type Writer = DebugOutput;

    fn make_writer(&'a self) -> Self::Writer {
        DebugOutput
    }
}

impl Write for DebugOutput {
    #[cfg(target_os = "windows")]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        use windows::Win32::System::Diagnostics::Debug::OutputDebugStringW;

        let wide = crate::runtime::conv::str_c_w(&String::from_utf8_lossy(buf));
        unsafe { OutputDebugStringW(windows::core::PCWSTR(wide.as_ptr())) };
        Ok(buf.len())
    }

    #[cfg(not(target_os = "windows"))]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
