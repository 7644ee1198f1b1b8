use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use log::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use std::env;
use std::process;

use chainledger::api;
use chainledger::blockchain::{self, crypto, Ledger, GENESIS_SENTINEL};
use chainledger::client::ReplicationClient;
use chainledger::config::{self, Command, NodeConfig};

/// Identity that owns the genesis registration
const ADMIN_IDENTITY: &str = GENESIS_SENTINEL;

// Create the ledger and seed it with the administrator's registration
fn initialize_ledger(config: &NodeConfig) -> anyhow::Result<Ledger> {
    let ledger = Ledger::with_max_attempts(&config.difficulty, config.max_attempts);

    let admin = crypto::generate_keypair()?;
    let genesis = ledger.insert_genesis(
        ADMIN_IDENTITY,
        &admin.public_key,
        &admin.private_key,
        crypto::sign,
    )?;

    info!("Genesis block {} issued by {}", genesis.hash(), ADMIN_IDENTITY);
    // Operators need this key to sign blocks as the administrator
    info!("Admin private key:\n{}", admin.private_key);

    Ok(ledger)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::mine,
        api::handlers::catchup,
        api::handlers::get_chain,
        api::handlers::validate_chain,
        api::handlers::dump,
        api::handlers::get_wallet
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::WalletRegistration,
            blockchain::Transfer,
            api::handlers::MineForm,
            api::handlers::MineResponse,
            api::handlers::ChainResponse
        )
    ),
    tags(
        (name = "ledger", description = "Ledger node endpoints")
    ),
    info(
        title = "Ledger Node API",
        version = "1.0.0",
        description = "Proof-of-work ledger node: mining requests and catch-up",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

async fn serve(config: NodeConfig) -> anyhow::Result<()> {
    let ledger = web::Data::new(initialize_ledger(&config)?);

    info!(
        "Starting HTTP server at http://{} (difficulty {:?}, max attempts {})",
        config.bind, config.difficulty, config.max_attempts
    );

    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(ledger.clone())
            .configure(api::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
    })
    .bind(config.bind.as_str())?
    .run()
    .await?;

    Ok(())
}

async fn catch_up(config: NodeConfig) {
    let ledger = Ledger::with_max_attempts(&config.difficulty, config.max_attempts);
    let client = ReplicationClient::new(ledger, config.peers);

    let report = client.catchup().await;
    if report.failed_peers > 0 {
        warn!("{} peer(s) failed during catch-up", report.failed_peers);
    }
    info!(
        "Caught up {} block(s), local chain length {}",
        report.applied,
        client.ledger().len()
    );
    print!("{}", client.ledger().dump());
}

fn new_wallet() -> anyhow::Result<()> {
    let keypair = crypto::generate_keypair()?;

    println!("PUBKEY:");
    println!("{}", keypair.public_key);
    println!("PRIVATE KEY:");
    println!("{}", keypair.private_key);

    Ok(())
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let program = env::args().next().unwrap_or_else(|| "chainledger".to_string());
    if env::args().skip(1).any(|arg| arg == "-h" || arg == "--help") {
        println!("{}", config::usage(&program));
        return Ok(());
    }

    let config = match NodeConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}\n\n{}", err, config::usage(&program));
            process::exit(1);
        }
    };

    match config.command {
        Command::Server => serve(config).await,
        Command::Client => {
            catch_up(config).await;
            Ok(())
        }
        Command::NewWallet => new_wallet(),
    }
}
