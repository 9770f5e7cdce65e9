fn main() {
    println!("Shared Counter Race Demonstration");
    println!("=================================\n");
    println!("This project demonstrates lost updates on a shared counter");
    println!("and the locking disciplines that prevent them.\n");
    println!("Run one of the following binaries:");
    println!("  cargo run --bin problem   - Unsynchronized increments losing updates");
    println!("  cargo run --bin solution  - Locking disciplines counting exactly\n");
    println!("Run tests with:");
    println!("  cargo test");
}
