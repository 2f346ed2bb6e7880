//! Resolves each argument through the event loop, sharing one manager.

use std::cell::Cell;
use std::env::args;
use std::net::Ipv4Addr;
use std::rc::Rc;

use resolve_stub::{
    default_config, EventLoop, ResolveError, Resolver, ResolverId, ResolverListener,
};

struct Printer {
    names: Vec<String>,
    pending: Cell<usize>,
}

impl ResolverListener for Printer {
    fn on_resolved(&self, id: ResolverId, addresses: &[Ipv4Addr]) {
        let name = &self.names[id.0];
        let n = addresses.len() - 1;

        if n == 0 {
            println!("\"{}\" resolved to {}", name, addresses[0]);
        } else {
            println!("\"{}\" resolved to {} ({} more)", name, addresses[0], n);
        }
        self.pending.set(self.pending.get() - 1);
    }

    fn on_resolver_error(&self, id: ResolverId, error: ResolveError) {
        println!("failed to resolve \"{}\": {}", self.names[id.0], error);
        self.pending.set(self.pending.get() - 1);
    }
}

fn main() {
    env_logger::init();

    let args = args().collect::<Vec<_>>();

    if args.len() == 1 {
        println!("Usage: {} <host name> [...]", args[0]);
        return;
    }

    let config = match default_config() {
        Ok(config) => config,
        Err(e) => {
            println!("failed to load system configuration: {}", e);
            return;
        }
    };

    let mut event_loop = match EventLoop::new() {
        Ok(ev) => ev,
        Err(e) => {
            println!("failed to create event loop: {}", e);
            return;
        }
    };

    let manager = event_loop.manager(config);
    let printer = Rc::new(Printer {
        names: args[1..].to_vec(),
        pending: Cell::new(0),
    });

    let mut resolvers = Vec::new();

    for name in &args[1..] {
        let r = Resolver::new(&manager, printer.clone());
        printer.pending.set(printer.pending.get() + 1);

        if let Err(e) = r.resolve(name) {
            println!("failed to resolve \"{}\": {}", name, e);
            printer.pending.set(printer.pending.get() - 1);
        }
        resolvers.push(r);
    }

    if let Err(e) = event_loop.run_until(&manager, None, || printer.pending.get() == 0) {
        println!("event loop failed: {}", e);
    }
}
