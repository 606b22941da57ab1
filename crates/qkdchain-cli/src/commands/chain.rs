//! `qkdchain chain`: show a topology's curated chain.

use qkdchain_core::Chain;

pub fn run(topology: &str, show_qubits: bool) {
    let chain = Chain::for_topology(topology).unwrap_or_else(|e| super::fail(e));

    println!("Topology:        {}", chain.topology());
    println!("Device qubits:   {}", chain.device_qubits());
    println!("Chain capacity:  {}", chain.capacity());
    println!("Max route:       {}", chain.max_length());

    if show_qubits {
        println!();
        for (i, row) in chain.qubits().chunks(16).enumerate() {
            let ids: Vec<String> = row.iter().map(|q| format!("{q:>3}")).collect();
            println!("  {:>3}: {}", i * 16, ids.join(" "));
        }
    }
}
