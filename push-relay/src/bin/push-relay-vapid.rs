use push_relay::config::vapid::generate_keypair_b64;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_help();
        return Ok(());
    }

    let json = args.iter().any(|a| a == "--json");
    let (public_b64, private_b64) = generate_keypair_b64();

    if json {
        println!(
            "{}",
            serde_json::json!({ "public_key": public_b64, "private_key": private_b64 })
        );
    } else {
        println!("Public Key: {}", public_b64);
        println!("Private Key: {}", private_b64);
    }

    Ok(())
}

fn print_help() {
    println!("push-relay-vapid - Generate VAPID keys for Web Push");
    println!();
    println!("Usage:");
    println!("  push-relay-vapid           # prints 'Public Key:' and 'Private Key:' lines");
    println!("  push-relay-vapid --json    # prints JSON");
    println!();
    println!("Environment variables to set:");
    println!("  WEB_PUSH_VAPID_PUBLIC_KEY=<Public Key>");
    println!("  WEB_PUSH_VAPID_PRIVATE_KEY=<Private Key>");
    println!("  WEB_PUSH_VAPID_SUBJECT=mailto:admin@localhost");
}
