//! rrdpoll-get - one-shot SNMP probe
//!
//! Takes the same source URIs the daemon's configuration uses, issues the
//! lookup through the engine's sync wrapper and prints the value. Table
//! queries and plain GetNext walks are supported.

use anyhow::{Context, Result, bail};
use clap::Parser;
use rrdpoll_core::config::parse_source_uri;
use rrdpoll_core::engine::{Engine, EngineOptions};
use rrdpoll_core::logging::{self, LoggingOptions};
use rrdpoll_core::oid::{self, Oid};
use rrdpoll_core::persist::NullPersist;
use rrdpoll_core::engine::sync::SyncRequest;
use rrdpoll_core::snmp::{PduType, SnmpCode, value_matches};

/// One-shot SNMP query tool
#[derive(Parser, Debug)]
#[command(name = "rrdpoll-get")]
#[command(about = "Query a value the way the rrdpoll daemon would")]
#[command(version)]
struct Args {
    /// Source URI: snmp://community@host[:port]/oid[?query-oid=match]
    uri: String,

    /// Walk the subtree below the OID instead of reading it
    #[arg(short, long)]
    walk: bool,

    /// Request timeout in seconds
    #[arg(short, long, default_value_t = 5)]
    timeout: u64,

    /// SNMP packet retries
    #[arg(short, long, default_value_t = 3)]
    retries: u32,

    /// Log level (warnings only by default)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_tracing(&LoggingOptions {
        level: args.log_level.clone(),
        format: "compact".to_string(),
        file: None,
    })?;

    let source = parse_source_uri(&args.uri).context("parsing source uri")?;
    let field_oid = oid::resolve(&source.oid_text).context("resolving oid")?;

    let options = EngineOptions {
        retries: args.retries,
        ..EngineOptions::default()
    };
    let mut engine = Engine::new(options, Vec::new(), Box::new(NullPersist))
        .await
        .context("starting snmp engine")?;

    let request = |pdu_type: PduType, oid: Oid| SyncRequest {
        hostname: source.hostnames[0].clone(),
        port: source.port,
        community: source.community.clone(),
        version: source.version,
        interval_ms: 1000,
        timeout_ms: args.timeout * 1000,
        pdu_type,
        oid,
    };

    let outcome = if args.walk {
        walk(&mut engine, &request, &field_oid).await
    } else if let Some((query_text, match_text)) = source.query.clone() {
        let query_oid = oid::resolve(&query_text).context("resolving query oid")?;
        table_lookup(&mut engine, &request, &field_oid, &query_oid, match_text.as_deref()).await
    } else {
        get_one(&mut engine, &request, &field_oid).await
    };

    engine.shutdown();
    outcome
}

async fn get_one(
    engine: &mut Engine,
    request: &impl Fn(PduType, Oid) -> SyncRequest,
    oid: &Oid,
) -> Result<()> {
    let (code, reply) = engine.sync_request(&request(PduType::Get, oid.clone())).await?;
    match (code, reply) {
        (SnmpCode::NoError, Some(binding)) => {
            println!("{} = {}", binding.oid, binding.value);
            Ok(())
        }
        (code, _) => bail!("request failed: {code}"),
    }
}

async fn walk(
    engine: &mut Engine,
    request: &impl Fn(PduType, Oid) -> SyncRequest,
    root: &Oid,
) -> Result<()> {
    let mut current = root.clone();
    let mut rows = 0usize;
    loop {
        let (code, reply) = engine
            .sync_request(&request(PduType::GetNext, current.clone()))
            .await?;
        let binding = match (code, reply) {
            (SnmpCode::NoError, Some(binding)) => binding,
            (SnmpCode::NoSuchName, _) => break,
            (code, _) => bail!("request failed: {code}"),
        };
        if binding.value.is_exception() || !root.is_prefix_of(&binding.oid) {
            break;
        }
        println!("{} = {}", binding.oid, binding.value);
        rows += 1;
        current = binding.oid;
    }
    if rows == 0 {
        bail!("nothing below {root}");
    }
    Ok(())
}

async fn table_lookup(
    engine: &mut Engine,
    request: &impl Fn(PduType, Oid) -> SyncRequest,
    field_oid: &Oid,
    query_oid: &Oid,
    match_text: Option<&str>,
) -> Result<()> {
    let mut current = query_oid.clone();
    loop {
        let (code, reply) = engine
            .sync_request(&request(PduType::GetNext, current.clone()))
            .await?;
        let binding = match (code, reply) {
            (SnmpCode::NoError, Some(binding)) => binding,
            (code, _) => bail!("table search failed: {code}"),
        };
        if binding.value.is_exception()
            || binding.oid.len() != query_oid.len() + 1
            || !query_oid.is_prefix_of(&binding.oid)
        {
            bail!(
                "no table row matches '{}'",
                match_text.unwrap_or_default()
            );
        }

        let matched = match match_text {
            Some(text) => value_matches(&binding.value, text),
            None => true,
        };
        if matched {
            let Some(row) = binding.oid.last_sub() else {
                bail!("table row has no index");
            };
            let value_oid = field_oid.child(row).context("table row index too long")?;
            return get_one(engine, request, &value_oid).await;
        }
        current = binding.oid;
    }
}
