use std::ffi::OsString;

use clap::{App, Arg};
use regex::Regex;

use crate::NameFilter;

/// Settings shared by every test binary using this runner.
#[derive(Clone, Debug, Default)]
pub struct RunnerConfig {
    /// Only tests whose full name matches are run; the rest are
    /// reported as filtered.
    pub filter: Option<NameFilter>,
    /// Run tests marked `#[ignore]` as well.
    pub include_ignored: bool,
    /// Let panic messages go straight to stderr instead of attaching
    /// them to the failing test's report.
    pub disable_capture: bool,
    /// Print one character per test instead of one line.
    pub quiet: bool,
}

impl RunnerConfig {
    /// Parses the libtest-compatible subset of the command line that
    /// this runner understands. Unknown flags (e.g. passed through by
    /// cargo) fall back to the default configuration.
    pub fn from_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let app = App::new("vigil test runner")
            .arg(Arg::with_name("FILTER")
                .help("Only run tests whose name matches this regex")
                .index(1))
            .arg(Arg::with_name("exact")
                .long("exact")
                .help("Match the filter against the full test name"))
            .arg(Arg::with_name("ignored")
                .long("ignored")
                .alias("include-ignored")
                .help("Also run ignored tests"))
            .arg(Arg::with_name("nocapture")
                .long("nocapture")
                .help("Don't capture panic output"))
            .arg(Arg::with_name("quiet")
                .long("quiet")
                .short("q")
                .help("Display one character per test"));

        let matches = match app.get_matches_from_safe(args) {
            Ok(matches) => matches,
            Err(e) => {
                eprintln!("ignoring test runner arguments: {}", e.message);
                return Default::default();
            },
        };

        let exact = matches.is_present("exact");
        let filter = matches.value_of("FILTER").and_then(|pat| {
            if exact {
                return Some(NameFilter::Exact(pat.to_owned()));
            }
            Regex::new(pat)
                .map(NameFilter::Pattern)
                .map_err(|e| eprintln!("invalid test filter `{}`: {}", pat, e))
                .ok()
        });

        RunnerConfig {
            filter,
            include_ignored: matches.is_present("ignored"),
            disable_capture: matches.is_present("nocapture"),
            quiet: matches.is_present("quiet"),
        }
    }
}
