// SPDX-License-Identifier: MIT OR Apache-2.0

mod common;

use std::time::Duration;

use docwire::{BindOptions, ConnectOptions, WireOptions, bind, connect};
use tokio::time::sleep;

use common::{append_text, read_text, settle, setup_logging, wait_for_text};

#[tokio::test]
async fn clients_converge_in_both_directions() {
    setup_logging();

    let server = bind("memory", BindOptions::default()).await.unwrap();
    let client0 = connect("memory", ConnectOptions::new(WireOptions::memory(&server)))
        .await
        .unwrap();
    let client1 = connect("memory", ConnectOptions::new(WireOptions::memory(&server)))
        .await
        .unwrap();

    append_text(client0.document(), "Hello").await;
    wait_for_text(client1.document(), "Hello", Duration::from_secs(1)).await;

    append_text(client1.document(), ", World!").await;
    wait_for_text(client0.document(), "Hello, World!", Duration::from_secs(1)).await;
}

#[tokio::test]
async fn manual_push_and_pull_gate_the_exchange() {
    setup_logging();

    let server = bind("memory", BindOptions::default()).await.unwrap();
    let client0 = connect("memory", ConnectOptions::new(WireOptions::memory(&server)))
        .await
        .unwrap();
    let client1 = connect(
        "memory",
        ConnectOptions::new(WireOptions::memory(&server))
            .auto_push(false)
            .auto_pull(false),
    )
    .await
    .unwrap();

    append_text(client0.document(), "Hello").await;
    append_text(client0.document(), ", ").await;
    settle().await;
    assert_eq!(read_text(client1.document()).await, "");
    assert!(!client1.synchronized().is_set());

    client1.pull();
    tokio::time::timeout(Duration::from_secs(1), client1.synchronized().wait())
        .await
        .expect("handshake after pull");
    assert_eq!(read_text(client1.document()).await, "Hello, ");

    append_text(client1.document(), "World!").await;
    settle().await;
    assert_eq!(read_text(client0.document()).await, "Hello, ");

    client1.push();
    wait_for_text(client0.document(), "Hello, World!", Duration::from_secs(1)).await;
}

#[tokio::test]
async fn every_peer_exchanges_peer_count_plus_two_messages() {
    setup_logging();

    for client_nb in [1usize, 2, 5, 10] {
        let server = bind("memory", BindOptions::default()).await.unwrap();
        let mut clients = Vec::with_capacity(client_nb);
        for _ in 0..client_nb {
            let client = connect("memory", ConnectOptions::new(WireOptions::memory(&server)))
                .await
                .unwrap();
            clients.push(client);
        }

        for client in &clients {
            append_text(client.document(), "Hello").await;
        }

        let expected = client_nb + 2;
        let all_settled = |clients: &[docwire::Client]| {
            clients.iter().all(|client| {
                let stats = client.channel().stats();
                stats.sent == expected && stats.received == expected
            })
        };

        tokio::time::timeout(Duration::from_secs(2), async {
            while !all_settled(&clients) {
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap_or_else(|_| {
            let stats: Vec<_> = clients
                .iter()
                .map(|client| client.channel().stats())
                .collect();
            panic!("peers never reached {expected} messages each: {stats:?}");
        });

        // No further traffic may trickle in afterwards.
        settle().await;
        for client in &clients {
            let stats = client.channel().stats();
            assert_eq!(stats.sent, expected);
            assert_eq!(stats.received, expected);
        }
    }
}
