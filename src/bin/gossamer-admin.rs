#!/usr/bin/env cargo
use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde_json::Value;

use gossamer::api::paths;
use gossamer::MembershipRecord;

#[derive(Parser)]
#[command(name = "gossamer-admin")]
#[command(about = "Gossamer cluster inspection tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the members one node knows about
    Members {
        /// HTTP address of the node (e.g., "127.0.0.1:4800")
        #[arg(long)]
        node: SocketAddr,
    },
    /// Check health of cluster nodes
    Health {
        /// Nodes to check (e.g., "127.0.0.1:4800,127.0.0.1:4810")
        #[arg(long)]
        nodes: String,
    },
    /// Check that every node reports the same membership
    Convergence {
        /// Nodes to compare (e.g., "127.0.0.1:4800,127.0.0.1:4810")
        #[arg(long)]
        nodes: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = Client::new();

    match cli.command {
        Commands::Members { node } => {
            let members = fetch_members(&client, node).await?;
            print_members(node, &members);
        }
        Commands::Health { nodes } => {
            check_cluster_health(&client, &parse_nodes(&nodes)?).await;
        }
        Commands::Convergence { nodes } => {
            check_convergence(&client, &parse_nodes(&nodes)?).await?;
        }
    }

    Ok(())
}

async fn fetch_members(client: &Client, node: SocketAddr) -> anyhow::Result<Vec<MembershipRecord>> {
    let url = format!("http://{}{}", node, paths::members::MEMBERS);
    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Node {} is unreachable", node))?;
    if !response.status().is_success() {
        bail!("Node {} returned HTTP {}", node, response.status());
    }
    response
        .json::<Vec<MembershipRecord>>()
        .await
        .with_context(|| format!("Node {} sent an invalid member list", node))
}

fn print_members(node: SocketAddr, members: &[MembershipRecord]) {
    println!("Members known to {} ({}):", node, members.len());
    for member in members {
        println!(
            "  {}  {:<21}  {:<7}  incarnation={}",
            member.id, member.address, member.status, member.incarnation
        );
    }
}

async fn check_cluster_health(client: &Client, nodes: &[SocketAddr]) {
    println!("Checking cluster health...");

    for node in nodes {
        let health_url = format!("http://{}{}", node, paths::base::HEALTH);
        match client.get(&health_url).send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<Value>().await {
                    Ok(health) => {
                        let status = health.get("status").and_then(Value::as_str).unwrap_or("unknown");
                        println!("Node {}: {}", node, status);
                    }
                    Err(_) => println!("Node {}: healthy but invalid response format", node),
                }
            }
            Ok(response) => {
                println!("Node {}: HTTP {}", node, response.status());
            }
            Err(e) => {
                println!("Node {}: unreachable ({})", node, e);
            }
        }
    }
}

async fn check_convergence(client: &Client, nodes: &[SocketAddr]) -> anyhow::Result<()> {
    let mut views = BTreeMap::new();
    for node in nodes {
        let members = fetch_members(client, *node).await?;
        views.insert(*node, member_ids(&members));
    }

    match converged_view(&views) {
        Some(ids) => {
            println!("Converged: {} nodes agree on {} members", views.len(), ids.len());
            Ok(())
        }
        None => {
            for (node, ids) in &views {
                println!("  {} sees {:?}", node, ids);
            }
            Err(anyhow!("Membership views have not converged"))
        }
    }
}

fn member_ids(members: &[MembershipRecord]) -> BTreeSet<String> {
    members.iter().map(|member| member.id.clone()).collect()
}

/// The shared view when every node reports the same member ids
fn converged_view(views: &BTreeMap<SocketAddr, BTreeSet<String>>) -> Option<&BTreeSet<String>> {
    let mut iter = views.values();
    let first = iter.next()?;
    iter.all(|view| view == first).then_some(first)
}

fn parse_nodes(nodes: &str) -> anyhow::Result<Vec<SocketAddr>> {
    let parsed: Vec<SocketAddr> = nodes
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<SocketAddr>().map_err(|e| anyhow!("Invalid address '{}': {}", s, e)))
        .collect::<anyhow::Result<_>>()?;
    if parsed.is_empty() {
        bail!("No nodes given");
    }
    Ok(parsed)
}
