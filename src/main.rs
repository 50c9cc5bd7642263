//! This program measures the CPU overhead of `nova-fairness` on a virtualization host. Which
//! experiment is run is chosen by passing different command line arguments.

// Useful common routines
#[macro_use]
mod common;


fn run() -> Result<(), failure::Error> {
    let matches = clap::App::new("fairness-runner")
        .about(
            "This program measures the CPU overhead of nova-fairness on a virtualization host. \
             Which experiment is run is chosen by passing different command line arguments.",
        )
        .arg(
            clap::Arg::with_name("PRINT_RESULTS_PATH")
                .long("print_results_path")
                .help("(For experiments) Print the results path as the last line of output."),
        )
        .subcommand(load_test::cli_options())
        .subcommand(runtime_test::cli_options())
        .setting(clap::AppSettings::SubcommandRequired)
        .setting(clap::AppSettings::DisableVersion)
        .get_matches();

    let print_results_path = matches.is_present("PRINT_RESULTS_PATH");

    match matches.subcommand() {
        ("load_test", Some(sub_m)) => load_test::run(print_results_path, sub_m),
        ("runtime_test", Some(sub_m)) => runtime_test::run(sub_m),

        _ => {
            unreachable!();
        }
    }
}

fn main() {
    use console::style;

    env_logger::init();

    // Always collect backtraces; runs are dominated by sleeping, not by us.
    std::env::set_var("RUST_BACKTRACE", "1");

    if let Err(err) = run() {
        const MESSAGE: &str =
r#"== ERROR ==================================================================================
`fairness-runner` encountered an error. The command log above may offer clues. If the error
pertains to SSH, you may be able to get useful information by setting the RUST_LOG=debug
environment variable."#;

        println!("{}", style(MESSAGE).red().bold());

        // Errors from SSH commands
        if err.downcast_ref::<spurs::SshError>().is_some() {
            println!("An error occurred while attempting to run a command over SSH");
        }

        println!(
            "`fairness-runner` encountered the following error:\n{}\n{}",
            err.as_fail(),
            err.backtrace(),
        );

        std::process::exit(101);
    }
}
