// SPDX-License-Identifier: MIT OR Apache-2.0

mod common;

use docwire::{BindOptions, ConnectOptions, ServerWireOptions, bind, connect};

#[tokio::test]
async fn unknown_client_wire_names_the_missing_package() {
    common::setup_logging();

    let options = ConnectOptions::new(docwire::FileOptions::new("unused"));
    let err = connect("foo", options).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "No client found for \"foo\", did you forget to install \"wire-foo\"?"
    );
}

#[tokio::test]
async fn unknown_server_wire_names_the_missing_package() {
    common::setup_logging();

    let err = bind("foo", BindOptions::default()).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "No server found for \"foo\", did you forget to install \"wire-foo\"?"
    );
}

#[tokio::test]
async fn mismatched_wire_options_are_rejected() {
    common::setup_logging();

    let server = bind("memory", BindOptions::default()).await.unwrap();
    let options = ConnectOptions::new(docwire::WireOptions::memory(&server));
    let err = connect("file", options).await.unwrap_err();
    assert!(matches!(err, docwire::Error::InvalidWireOptions("file")));

    let err = bind("pipe", BindOptions::new(ServerWireOptions::Memory))
        .await
        .unwrap_err();
    assert!(matches!(err, docwire::Error::InvalidWireOptions("pipe")));
}
