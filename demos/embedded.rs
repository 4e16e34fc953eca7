//! Embedded-mode demo: using the storage engine directly, no server.
//!
//! ```text
//! cargo run --example embedded
//! ```

use bytes::Bytes;
use std::time::Duration;
use susydb::storage::Store;

fn main() {
    println!("SusyDB Embedded Mode Demo");

    let store = Store::new();

    println!("1. Setting key 'greeting'...");
    store
        .set(
            Bytes::from("greeting"),
            Bytes::from("Hello from Embedded SusyDB!"),
        )
        .unwrap();

    if let Some(value) = store.get(&Bytes::from("greeting")).unwrap() {
        println!("2. Got value: {}", String::from_utf8_lossy(&value));
    }

    println!("3. Incrementing counter...");
    let count = store.incr_by(&Bytes::from("my_counter"), 1).unwrap();
    println!("   Counter is now: {count}");

    println!("4. Setting volatile key (1s TTL)...");
    store
        .set_with_ttl(
            Bytes::from("volatile"),
            Bytes::from("I will disappear"),
            Duration::from_secs(1),
        )
        .unwrap();

    std::thread::sleep(Duration::from_millis(1500));

    match store.get(&Bytes::from("volatile")).unwrap() {
        None => println!("5. Volatile key expired as expected"),
        Some(_) => println!("Volatile key failed to expire!"),
    }
}
