use anyhow::Context;
use log::{error, info, warn};

use client::{ApiError, PrismClient};
use config::PrismConfig;
use edit_address::AddressEdit;

mod client;
mod config;
mod edit_address;
mod list_vms;
mod types;

const APP_NAME: &str = "pcvm";

const SUB_CMD_LIST: &str = "list";
const SUB_CMD_ADDRESS: &str = "address";

fn main() {
    let app = clap::Command::new(APP_NAME)
        .version(clap::crate_version!())
        .about("Command line for VM addresses managed through Prism Central")
        .subcommand_required(true)
        .subcommand(
            clap::Command::new(SUB_CMD_LIST)
                .about("List the VM inventory with interface and address details")
                .arg(
                    clap::Arg::new("VERBOSE")
                        .long("verbose")
                        .action(clap::ArgAction::SetTrue)
                        .help("Enables DEBUG log level"),
                ),
        )
        .subcommand(
            clap::Command::new(SUB_CMD_ADDRESS)
                .about("Report a node's interfaces and optionally add or remove \
                 an IP address within one of its attached subnets")
                .arg(
                    clap::Arg::new("NODE-NAME")
                        .required(true)
                        .long("node-name")
                        .help("Name of the node to inspect or update"),
                )
                .arg(
                    clap::Arg::new("ADD-ADDRESS")
                        .long("add-address")
                        .help("Add this IP address"),
                )
                .arg(
                    clap::Arg::new("REMOVE-ADDRESS")
                        .long("remove-address")
                        .help("Remove this IP address"),
                )
                .arg(
                    clap::Arg::new("VERBOSE")
                        .long("verbose")
                        .action(clap::ArgAction::SetTrue)
                        .help("Enables DEBUG log level"),
                ),
        );

    let matches = app.get_matches();

    match matches.subcommand() {
        Some((SUB_CMD_LIST, cmd)) => {
            setup_logger(cmd);

            match run_list() {
                Ok(..) => {
                    info!("Successfully listed VMs");
                }
                Err(err) => fatal("Listing VMs failed", err),
            }
        }
        Some((SUB_CMD_ADDRESS, cmd)) => {
            let node_name = cmd
                .get_one::<String>("NODE-NAME")
                .expect("--node-name is required");

            setup_logger(cmd);

            // Validated before loading any config or contacting the API.
            let edit = match AddressEdit::new(
                cmd.get_one::<String>("ADD-ADDRESS"),
                cmd.get_one::<String>("REMOVE-ADDRESS"),
            ) {
                Ok(edit) => edit,
                Err(err) => fatal("Invalid arguments", err),
            };

            match run_address(node_name, &edit) {
                Ok(..) => {
                    info!("Finished processing node '{node_name}'");
                }
                Err(err) => fatal("Processing node failed", err),
            }
        }
        _ => unreachable!("Unrecognized subcommand"),
    }
}

fn run_list() -> Result<(), anyhow::Error> {
    let config = PrismConfig::load()?;
    let client = PrismClient::new(&config).context("Constructing the API client")?;

    list_vms::list(&client)
}

fn run_address(node_name: &str, edit: &AddressEdit) -> Result<(), anyhow::Error> {
    let config = PrismConfig::load()?;
    let client = PrismClient::new(&config).context("Constructing the API client")?;

    edit_address::edit(&client, node_name, edit)
}

fn fatal(action: &str, err: anyhow::Error) -> ! {
    error!("{action}: {err:#}");
    if err.chain().any(|cause| {
        cause
            .downcast_ref::<ApiError>()
            .is_some_and(ApiError::is_transient)
    }) {
        warn!("The failure looks transient, rerunning the command may succeed");
    }
    std::process::exit(1)
}

fn setup_logger(matches: &clap::ArgMatches) {
    let verbose_arg = "VERBOSE";

    let mut log_builder = env_logger::Builder::new();
    if matches
        .try_get_one::<bool>(verbose_arg)
        .is_ok_and(|arg| arg.is_some_and(|&value| value))
    {
        log_builder.filter(None, log::LevelFilter::Debug);
    } else {
        log_builder.filter(None, log::LevelFilter::Info);
    }
    log_builder.init();
}
