use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::TryRecvError;

use cm_admin::alert::RecordingNotifier;
use cm_admin::api::{CloudMailingApi, HttpApi};
use cm_admin::credentials::MemoryCredentialStore;
use cm_admin::error::ApiError;
use cm_admin::session::{AuthEvent, AuthEvents, SessionContext, SessionState};

/// Serve every connection on an ephemeral localhost port with the same canned reply.
async fn start_canned_server(status: &'static str, body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        request.extend_from_slice(&buf[..n]);
                        if request.windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                }
            }
            let reply = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(reply.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    addr
}

async fn api_for(status: &'static str, body: &'static str, events: &AuthEvents) -> HttpApi {
    let addr = start_canned_server(status, body).await;
    HttpApi::new(format!("http://{addr}"), events.clone()).unwrap()
}

#[tokio::test]
async fn unauthenticated_reply_is_broadcast() {
    let events = AuthEvents::new();
    let mut rx = events.subscribe();
    let api = api_for("401 Unauthorized", "", &events).await;

    let err = api.current_user().await.unwrap_err();
    assert!(matches!(err, ApiError::NotAuthenticated));
    assert!(err.is_session());
    assert_eq!(rx.try_recv().unwrap(), AuthEvent::NotAuthenticated);
}

#[tokio::test]
async fn forbidden_reply_is_broadcast() {
    let events = AuthEvents::new();
    let mut rx = events.subscribe();
    let api = api_for("403 Forbidden", "", &events).await;

    let err = api.cpu().await.unwrap_err();
    assert!(matches!(err, ApiError::NotAuthorized));
    assert_eq!(rx.try_recv().unwrap(), AuthEvent::NotAuthorized);
}

#[tokio::test]
async fn login_timeout_reply_is_broadcast() {
    let events = AuthEvents::new();
    let mut rx = events.subscribe();
    let api = api_for("440 Login Time-out", "", &events).await;

    let err = api.current_user().await.unwrap_err();
    assert!(err.is_session());
    assert_eq!(err.status(), Some(440));
    assert_eq!(rx.try_recv().unwrap(), AuthEvent::SessionTimeout);
}

#[tokio::test]
async fn business_error_is_not_broadcast() {
    let events = AuthEvents::new();
    let mut rx = events.subscribe();
    let api = api_for(
        "500 Internal Server Error",
        r#"{"detail": "database locked"}"#,
        &events,
    )
    .await;

    let err = api.disk().await.unwrap_err();
    assert!(!err.is_session());
    assert_eq!(err.detail(), Some("database locked"));
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn session_listener_expires_on_server_timeout() {
    let events = AuthEvents::new();
    let api = Arc::new(api_for("419 Authentication Timeout", "", &events).await);
    let session = Arc::new(SessionContext::new(
        api.clone(),
        Arc::new(MemoryCredentialStore::default()),
        Arc::new(RecordingNotifier::default()),
        events.clone(),
    ));
    let listener = session.spawn_listener();

    assert!(api.current_user().await.unwrap_err().is_session());
    for _ in 0..50 {
        if session.state() == SessionState::SessionExpired {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(session.state(), SessionState::SessionExpired);
    listener.abort();
}
