//! Platform-dependent constants the executor derives (engine §4.5).

/// The `make` binary name: `gmake` on FreeBSD, `make` everywhere else.
pub fn make_binary() -> &'static str {
    if cfg!(target_os = "freebsd") {
        "gmake"
    } else {
        "make"
    }
}

/// The Python interpreter to invoke for `python`-type builds.
pub fn python_binary() -> &'static str {
    "python3"
}

/// The shared-library extension for the current platform.
pub fn lib_extension() -> &'static str {
    if cfg!(target_os = "macos") {
        ".dylib"
    } else if cfg!(target_os = "windows") {
        ".dll"
    } else {
        ".so"
    }
}

/// Number of parallel make jobs to hand to child builds, per the host CPU
/// count (`MAKE_JOBS` in recipe environments).
pub fn make_jobs() -> usize {
    num_cpus::get()
}
