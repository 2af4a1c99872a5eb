// demos/proxy_auth.rs

//! Fetch a URL through an authenticating forward proxy.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example proxy_auth -- http://127.0.0.1:8080/foo \
//!     --proxy 127.0.0.1:3128 --proxy-user johndoe --proxy-pass pass \
//!     --user user --pass passwd --preemptive
//! ```
//!
//! Set `RUST_LOG=hopauth=debug` to watch the negotiation.

use hopauth::auth::{ProxyCredential, Realm};

fn arg(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: proxy_auth <url> [OPTIONS]");
        eprintln!();
        eprintln!("Options:");
        eprintln!("  --proxy <host:port>     Forward proxy to route through");
        eprintln!("  --proxy-user <user>     Proxy principal");
        eprintln!("  --proxy-pass <pass>     Proxy secret");
        eprintln!("  --user <user>           Origin principal");
        eprintln!("  --pass <pass>           Origin secret");
        eprintln!("  --preemptive            Send origin credentials before any challenge");
        std::process::exit(1);
    }

    let client = hopauth::Client::new();
    let mut request = client.get(&args[1]);

    if let (Some(user), Some(pass)) = (arg(&args, "--user"), arg(&args, "--pass")) {
        let preemptive = args.iter().any(|a| a == "--preemptive");
        request = request.realm(Realm::basic(user, pass).preemptive(preemptive));
    }

    if let Some(proxy) = arg(&args, "--proxy") {
        let (host, port) = proxy
            .rsplit_once(':')
            .ok_or("--proxy must be host:port")?;
        let port: u16 = port.parse()?;
        let user = arg(&args, "--proxy-user").unwrap_or_default();
        let pass = arg(&args, "--proxy-pass").unwrap_or_default();
        request = request.proxy(ProxyCredential::basic(host, port, user, pass));
    }

    let res = request.send().await?;

    println!("Status: {}", res.status());
    for (name, value) in res.headers() {
        println!("{}: {:?}", name, value);
    }
    println!();
    println!("{}", res.text());

    if !client.proxy_cache().is_empty() {
        println!();
        println!("proxy accepted the credentials; later requests skip the 407");
    }

    Ok(())
}
