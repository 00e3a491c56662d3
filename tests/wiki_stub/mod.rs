use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const FOO_BAR: &str = r#"<!doctype html>
<html>
  <head><title>Foo Bar</title></head>
  <body>
    <div id="content">
      <h1>Foo Bar</h1>
      <p>The Foo Bar is a small tavern on the road between Anvil and Holberg. Travellers have rested there for generations, and its cellars are said to run deeper than the hill it stands on.</p>
      <h2>History</h2>
      <p>It was founded in 312YE by a retired quartermaster of the Imperial armies. The tavern changed hands many times before the current owners restored the old hall and reopened the stables.</p>
      <img src="/images/foo_bar.png" alt="The tavern sign">
      <ul>
        <li>Warm beds</li>
        <li>Cold cider</li>
      </ul>
      <p>Visitors are reminded that the cellar door is kept locked after dark, and that the landlord does not answer questions about what lies beneath.</p>
    </div>
    <div id="pageCategories">Categories: <a href="/Category:Taverns">Taverns</a></div>
  </body>
</html>
"#;

/// Serves `/Foo_Bar` as a wiki article; every other path is missing.
pub struct WikiStub {
    pub base_url: String,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl WikiStub {
    pub fn spawn() -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start wiki stub server");
        let base_url = format!("http://{}", server.server_addr());
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }
                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };
                let response = if request.url() == "/Foo_Bar" {
                    tiny_http::Response::from_string(FOO_BAR)
                        .with_status_code(200)
                        .with_header(
                            tiny_http::Header::from_bytes(
                                &b"Content-Type"[..],
                                &b"text/html; charset=utf-8"[..],
                            )
                            .expect("build header"),
                        )
                } else {
                    tiny_http::Response::from_string("There is currently no text in this page.")
                        .with_status_code(404)
                };
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}

impl Drop for WikiStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
