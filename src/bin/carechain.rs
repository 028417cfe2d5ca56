#![forbid(unsafe_code)]
//! Command-line client for a CareChain node

use carechain::blockchain::{Block, ChainSnapshot};
use carechain::crypto::{hash_data, verify_signature, KeyPair};
use carechain::record::{MedicalRecord, KNOWN_RECORD_TYPES};
use clap::{Parser, Subcommand};
use colored::*;
use serde_json::{json, Value};

#[derive(Parser, Debug)]
#[command(name = "carechain", version, about = "Talk to a CareChain node")]
struct Cli {
    /// Base URL of the node
    #[arg(long, global = true, default_value = "http://127.0.0.1:5000")]
    node: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a medical record to the pending pool
    Submit {
        #[arg(long)]
        patient: String,
        #[arg(long)]
        doctor: String,
        /// diagnosis, prescription, lab_result, ...
        #[arg(long = "type")]
        record_type: String,
        /// Record payload as a JSON document
        #[arg(long)]
        data: String,
        /// Hex secret key used to sign the record
        #[arg(long)]
        sign_with: Option<String>,
    },
    /// Package pending records into a block
    Mine,
    /// Print the node's chain
    Chain,
    /// List records waiting to be mined
    Pending,
    /// Register peer nodes
    Register {
        #[arg(required = true)]
        nodes: Vec<String>,
    },
    /// Run consensus against registered peers
    Resolve,
    /// Check the integrity of the node's chain
    Validate,
    /// Generate a new secp256k1 key pair
    Keygen,
    /// Sign arbitrary data with a hex secret key
    Sign {
        #[arg(long)]
        secret: String,
        data: String,
    },
    /// Check a signature produced by `sign`
    Verify {
        #[arg(long)]
        public: String,
        #[arg(long)]
        signature: String,
        data: String,
    },
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn endpoint(node: &str, path: &str) -> String {
    format!("{}{}", node.trim_end_matches('/'), path)
}

async fn read_body(response: reqwest::Response) -> Result<(u16, Value), reqwest::Error> {
    let status = response.status().as_u16();
    let body = response.json::<Value>().await.unwrap_or(Value::Null);
    Ok((status, body))
}

fn report(status: u16, body: &Value) {
    let text = body
        .get("message")
        .or_else(|| body.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());
    if (200..300).contains(&status) {
        println!("{} {}", "✔".bright_green(), text.green());
    } else {
        println!("{} {} {}", "✘".bright_red(), format!("[{}]", status).red(), text.red());
    }
}

fn print_block(block: &Block) {
    println!(
        "{} {}  {} {}  {} {}",
        "Block".bright_cyan().bold(),
        format!("#{}", block.index).bright_white().bold(),
        "records:".dimmed(),
        block.transactions.len(),
        "timestamp:".dimmed(),
        block.timestamp
    );
    println!("  {} {}", "hash:    ".dimmed(), block.compute_hash());
    println!("  {} {}", "previous:".dimmed(), block.previous_hash);
    for record in &block.transactions {
        println!("    - {}", record.summary());
    }
}

async fn submit(
    client: &reqwest::Client,
    node: &str,
    patient: String,
    doctor: String,
    record_type: String,
    data: String,
    sign_with: Option<String>,
) -> CliResult {
    let data = data.trim();
    if data.is_empty() {
        return Err("Medical data cannot be empty".into());
    }
    let data: Value =
        serde_json::from_str(data).map_err(|e| format!("Invalid JSON format: {}", e))?;
    if patient.is_empty() || doctor.is_empty() || record_type.is_empty() {
        return Err("All fields (patient, doctor, type) are required".into());
    }
    if !KNOWN_RECORD_TYPES.contains(&record_type.as_str()) {
        println!(
            "{} unusual record type '{}' (expected one of {})",
            "!".yellow(),
            record_type,
            KNOWN_RECORD_TYPES.join(", ")
        );
    }

    let mut record = MedicalRecord::new(patient, doctor, record_type, data);
    if let Some(secret) = sign_with {
        let keypair = KeyPair::from_secret_hex(&secret)?;
        let signature = keypair.sign(&record.signable_message())?;
        record = record.with_signature(signature);
    }

    let response = client
        .post(endpoint(node, "/transactions/new"))
        .json(&record)
        .send()
        .await?;
    let (status, body) = read_body(response).await?;
    report(status, &body);
    Ok(())
}

#[tokio::main]
async fn main() -> CliResult {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let node = cli.node.as_str();

    match cli.command {
        Command::Submit {
            patient,
            doctor,
            record_type,
            data,
            sign_with,
        } => submit(&client, node, patient, doctor, record_type, data, sign_with).await?,
        Command::Mine => {
            let (status, body) = read_body(client.get(endpoint(node, "/mine")).send().await?).await?;
            report(status, &body);
            if let Some(index) = body.get("index") {
                println!("  {} {}", "index:".dimmed(), index);
            }
        }
        Command::Chain => {
            let snapshot: ChainSnapshot = client
                .get(endpoint(node, "/chain"))
                .send()
                .await?
                .json()
                .await?;
            println!("{} {}", "Chain length:".bright_cyan().bold(), snapshot.length);
            for block in &snapshot.chain {
                print_block(block);
            }
        }
        Command::Pending => {
            let body: Value = client
                .get(endpoint(node, "/transactions/pending"))
                .send()
                .await?
                .json()
                .await?;
            let records: Vec<MedicalRecord> =
                serde_json::from_value(body["transactions"].clone()).unwrap_or_default();
            println!("{} {}", "Pending records:".bright_cyan().bold(), records.len());
            for record in &records {
                println!("  - {}", record.summary());
            }
        }
        Command::Register { nodes } => {
            let response = client
                .post(endpoint(node, "/nodes/register"))
                .json(&json!({ "nodes": nodes }))
                .send()
                .await?;
            let (status, body) = read_body(response).await?;
            report(status, &body);
            if let Some(Value::Array(total)) = body.get("total_nodes") {
                for peer in total {
                    println!("  - {}", peer.as_str().unwrap_or_default());
                }
            }
        }
        Command::Resolve => {
            let (status, body) =
                read_body(client.get(endpoint(node, "/nodes/resolve")).send().await?).await?;
            report(status, &body);
            let chain = body.get("new_chain").or_else(|| body.get("chain"));
            if let Some(Value::Array(blocks)) = chain {
                println!("  {} {}", "length:".dimmed(), blocks.len());
            }
        }
        Command::Validate => {
            let body: Value = client
                .get(endpoint(node, "/chain/validate"))
                .send()
                .await?
                .json()
                .await?;
            if body["valid"].as_bool().unwrap_or(false) {
                println!("{} chain of {} blocks is valid", "✔".bright_green(), body["length"]);
            } else {
                println!("{} chain of {} blocks is INVALID", "✘".bright_red(), body["length"]);
            }
        }
        Command::Keygen => {
            let keypair = KeyPair::generate();
            println!("{} {}", "secret key:".bright_yellow(), keypair.secret_key_hex());
            println!("{} {}", "public key:".bright_green(), keypair.public_key_hex());
            println!(
                "{} {}",
                "key id:    ".dimmed(),
                hash_data(&keypair.public_key_hex())
            );
        }
        Command::Sign { secret, data } => {
            let keypair = KeyPair::from_secret_hex(&secret)?;
            println!("{}", keypair.sign(data.as_bytes())?);
        }
        Command::Verify {
            public,
            signature,
            data,
        } => match verify_signature(&public, data.as_bytes(), &signature) {
            Ok(()) => println!("{} signature is valid", "✔".bright_green()),
            Err(e) => {
                println!("{} {}", "✘".bright_red(), e.to_string().red());
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
