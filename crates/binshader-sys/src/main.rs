// Entry point for the binary shaders sample.
//
// Usage: binshader [-purge] [+set <cvar> <value> ...]
//
//   +set basedir <dir>            where the cache files are written
//   +set shader_purge_stale 1     rebuild instead of failing on a stale cache
//   +set soft_driver_version <n>  pretend the driver was upgraded
//   -purge                        delete the cache files before starting

use std::process::ExitCode;

use binshader_common::common::{com_error, init_tracing, ComArgs};
use binshader_common::cvar::CvarContext;
use binshader_renderer::CacheError;
use binshader_sys::binary_shaders;

fn main() -> ExitCode {
    let argv: Vec<String> = std::env::args().collect();
    let mut args = ComArgs::new();
    args.init(&argv);

    let mut cvars = CvarContext::new();
    cvars.add_early_commands(&mut args);
    binary_shaders::register_cvars(&mut cvars);

    let developer = cvars.variable_value("developer") != 0.0;
    if let Err(e) = init_tracing(developer) {
        eprintln!("{}", e);
    }
    if developer {
        cvars.list(None);
    }

    let purge = args.com_check_parm("-purge").is_some();

    match binary_shaders::run(&cvars, purge) {
        Ok(report) => {
            report.print();
            ExitCode::SUCCESS
        }
        Err(e @ CacheError::IncompatibleArtifact { .. }) => {
            com_error(&format!(
                "{}\nRun with -purge or +set shader_purge_stale 1 to rebuild it.",
                e
            ));
            ExitCode::FAILURE
        }
        Err(e) => {
            com_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
