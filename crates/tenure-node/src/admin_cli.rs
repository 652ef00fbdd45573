//! tenure-admin CLI tool
//!
//! Inspects a running Tenure node over its admin socket.
//!
//! Usage:
//!   tenure-admin member <id>
//!   tenure-admin members
//!   tenure-admin reconcile
//!   tenure-admin status
//!   tenure-admin ping

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use tenure_node::admin_socket::{AdminCommand, AdminResponse, MemberView};
use tenure_node::scheduler::PassReport;

fn print_usage() {
    eprintln!("tenure-admin - Inspect a Tenure node");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  tenure-admin member <id>   Show one member and their tier");
    eprintln!("  tenure-admin members       List stored members");
    eprintln!("  tenure-admin reconcile     Run a reconciliation pass now");
    eprintln!("  tenure-admin status        Registry and last pass summary");
    eprintln!("  tenure-admin ping          Check if the node is running");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  TENURE_SOCKET  Path to admin socket (default: ./tenure-data/admin.sock)");
}

fn get_socket_path() -> PathBuf {
    std::env::var("TENURE_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./tenure-data/admin.sock"))
}

fn send_command(cmd: AdminCommand) -> Result<AdminResponse, String> {
    let socket_path = get_socket_path();

    let mut stream = UnixStream::connect(&socket_path).map_err(|e| {
        format!(
            "Failed to connect to tenure-node at {:?}: {}\n\
             Is the tenure-node running?",
            socket_path, e
        )
    })?;

    let cmd_json = serde_json::to_string(&cmd).map_err(|e| e.to_string())?;
    writeln!(stream, "{}", cmd_json).map_err(|e| e.to_string())?;

    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| e.to_string())?;

    serde_json::from_str(&response_line).map_err(|e| format!("Invalid response: {}", e))
}

fn tier_name(tier: Option<tenure_tiers::Tier>) -> String {
    tier.map_or_else(|| "-".to_string(), |t| t.to_string())
}

fn print_member(member: &MemberView) {
    let joined = member
        .joined_at
        .map_or_else(|| "unknown".to_string(), |t| t.to_rfc3339());
    let labels: Vec<&str> = member.role_labels.iter().map(String::as_str).collect();
    print!(
        "{}\t{}\tjoined {}\tholds {}\tqualifies {}\t[{}]",
        member.id,
        member.display_name,
        joined,
        tier_name(member.held_tier),
        tier_name(member.target_tier),
        labels.join(", ")
    );
    if let Some(departed) = member.departed_at {
        print!("\tdeparted {}", departed.to_rfc3339());
    }
    println!();
}

fn print_report(report: &PassReport) {
    println!("as of:          {}", report.as_of.to_rfc3339());
    match report.listed {
        Some(n) => println!("listed:         {}", n),
        None => println!("listed:         (listing failed)"),
    }
    println!("visited:        {}", report.visited);
    println!("converged:      {}", report.converged);
    println!("changed:        {}", report.changed);
    println!("labels added:   {}", report.labels_added);
    println!("labels removed: {}", report.labels_removed);
    println!("labels missing: {}", report.labels_missing);
    println!("skipped:        {}", report.skipped);
    println!("pending:        {}", report.pending);
    println!("departed:       {}", report.departed);
    if report.forbidden {
        println!("mutations were refused by the space");
    }
    if report.interrupted {
        println!("pass was interrupted by shutdown");
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let cmd = match args[1].as_str() {
        "member" => {
            if args.len() < 3 {
                eprintln!("Error: member requires an id argument");
                std::process::exit(1);
            }
            AdminCommand::MemberInfo {
                id: args[2].as_str().into(),
            }
        }
        "members" => AdminCommand::ListMembers,
        "reconcile" => AdminCommand::ReconcileNow,
        "status" => AdminCommand::Status,
        "ping" => AdminCommand::Ping,
        "-h" | "--help" | "help" => {
            print_usage();
            std::process::exit(0);
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    };

    match send_command(cmd) {
        Ok(response) => match response {
            AdminResponse::Error { error } => {
                eprintln!("Error: {}", error);
                std::process::exit(1);
            }
            AdminResponse::Member { member } => print_member(&member),
            AdminResponse::Members { items } => {
                if items.is_empty() {
                    println!("(none)");
                }
                for member in &items {
                    print_member(member);
                }
            }
            AdminResponse::Pass { report } => print_report(&report),
            AdminResponse::Status {
                members,
                departed,
                dirty,
                tick_interval_secs,
                prerequisite_label,
                last_pass,
            } => {
                println!("members:        {} ({} departed)", members, departed);
                println!("unsaved:        {}", dirty);
                println!("tick interval:  {}s", tick_interval_secs);
                println!(
                    "prerequisite:   {}",
                    prerequisite_label.as_deref().unwrap_or("(none)")
                );
                match last_pass {
                    Some(report) => {
                        println!();
                        print_report(&report);
                    }
                    None => println!("no pass has completed yet"),
                }
            }
            AdminResponse::Pong => {
                println!("pong - tenure-node is running");
            }
        },
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
