//! Holded invoicing API: paginated document listings.
//!
//! The list endpoints take a page number, a page size and an inclusive epoch
//! range (`starttmp`/`endtmp`). Holded answers with a bare JSON array; other
//! deployments wrap the list in an object with pagination metadata, so both
//! shapes are accepted.
//!
//! Single sales orders and catalogue products are fetched by id for the
//! reservation sheet (`DocumentLookup`).

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::ACCEPT;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ApiSettings;
use crate::domain::{DocumentKind, InstantRange, RawDocument};
use crate::error::AppError;

pub const DEFAULT_BASE_URL: &str = "https://api.holded.com/api/invoicing/v1/documents";
pub const DEFAULT_PRODUCTS_URL: &str = "https://api.holded.com/api/invoicing/v1/products";
pub const DEFAULT_PAGE_LIMIT: usize = 200;

/// Upper bound on pages per listing, so a server that never signals the end
/// can't keep the run alive forever.
pub const MAX_PAGES: u32 = 1_000;

/// Header name Holded expects the API key in when bearer auth is off.
const API_KEY_HEADER: &str = "key";

const LIST_KEYS: [&str; 4] = ["data", "items", "results", "documents"];
const TOTAL_PAGES_KEYS: [&str; 3] = ["totalPages", "total_pages", "pages"];
const TOTAL_KEYS: [&str; 2] = ["total", "count"];
const HAS_MORE_KEYS: [&str; 2] = ["hasMore", "has_more"];

/// How the API key is presented. Exactly one scheme is used per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `key: <key>`
    ApiKeyHeader,
}

/// One page of a listing plus whatever pagination hints came with it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub documents: Vec<RawDocument>,
    pub total_pages: Option<u32>,
    pub total: Option<usize>,
    pub has_more: Option<bool>,
}

impl Page {
    pub fn from_documents(documents: Vec<RawDocument>) -> Self {
        Self {
            documents,
            ..Self::default()
        }
    }
}

/// Anything that can serve listing pages (the HTTP client, or a fixture in tests).
pub trait PageSource {
    /// Requested page size.
    fn page_limit(&self) -> usize;

    /// Fetch 1-based page `page` of `kind` documents dated inside `range`.
    fn fetch_page(&self, kind: DocumentKind, range: &InstantRange, page: u32) -> Result<Page, AppError>;
}

/// By-id lookups behind the reservation sheet.
pub trait DocumentLookup {
    fn sales_order(&self, id: &str) -> Result<RawDocument, AppError>;

    fn product(&self, id: &str) -> Result<RawDocument, AppError>;
}

/// Fetch every page of a listing and concatenate them in order.
pub fn fetch_documents<S: PageSource + ?Sized>(
    source: &S,
    kind: DocumentKind,
    range: &InstantRange,
) -> Result<Vec<RawDocument>, AppError> {
    let limit = source.page_limit().max(1);
    let mut out: Vec<RawDocument> = Vec::new();

    for page in 1..=MAX_PAGES {
        let Page {
            documents,
            total_pages,
            total,
            has_more,
        } = source.fetch_page(kind, range, page)?;

        let batch_len = documents.len();
        debug!(kind = kind.endpoint(), page, batch_len, "fetched page");
        if batch_len == 0 {
            info!(kind = kind.endpoint(), documents = out.len(), "listing complete");
            return Ok(out);
        }
        out.extend(documents);

        let last = match (has_more, total_pages, total) {
            (Some(more), _, _) => !more,
            (None, Some(pages), _) => page >= pages,
            (None, None, Some(total)) => out.len() >= total,
            (None, None, None) => batch_len < limit,
        };
        if last {
            info!(kind = kind.endpoint(), pages = page, documents = out.len(), "listing complete");
            return Ok(out);
        }
    }

    Err(AppError::upstream(format!(
        "{}: pagination did not terminate after {MAX_PAGES} pages",
        kind.noun()
    )))
}

/// Interpret a listing response body.
pub fn parse_page(body: Value) -> Result<Page, String> {
    match body {
        Value::Array(items) => Ok(Page::from_documents(collect_objects(items))),
        Value::Object(mut map) => {
            let list_key = LIST_KEYS
                .iter()
                .find(|key| map.get(**key).is_some_and(Value::is_array))
                .ok_or_else(|| {
                    let keys: Vec<&str> = map.keys().map(String::as_str).collect();
                    format!("response object has no document list (keys: {})", keys.join(", "))
                })?;
            let items = match map.remove(*list_key) {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            };
            Ok(Page {
                documents: collect_objects(items),
                total_pages: first_u64(&map, &TOTAL_PAGES_KEYS).and_then(|v| u32::try_from(v).ok()),
                total: first_u64(&map, &TOTAL_KEYS).and_then(|v| usize::try_from(v).ok()),
                has_more: HAS_MORE_KEYS.iter().find_map(|key| map.get(*key).and_then(Value::as_bool)),
            })
        }
        other => Err(format!("unexpected response type: {}", type_name(&other))),
    }
}

fn collect_objects(items: Vec<Value>) -> Vec<RawDocument> {
    let total = items.len();
    let docs: Vec<RawDocument> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect();
    if docs.len() < total {
        warn!(skipped = total - docs.len(), "listing contained non-object entries");
    }
    docs
}

fn first_u64(map: &RawDocument, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| match map.get(*key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Blocking HTTP client for the documents API.
pub struct HoldedClient {
    client: Client,
    base_url: String,
    products_url: String,
    api_key: String,
    auth: AuthMode,
    page_limit: usize,
}

impl HoldedClient {
    pub fn new(settings: &ApiSettings) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| AppError::config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            products_url: settings.products_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            auth: settings.auth,
            page_limit: settings.page_limit.max(1),
        })
    }

    pub fn endpoint_url(&self, kind: DocumentKind) -> String {
        format!("{}/{}", self.base_url, kind.endpoint())
    }

    fn request(&self, kind: DocumentKind, range: &InstantRange, page: u32) -> RequestBuilder {
        // The upstream range is inclusive on both ends; stop one second short
        // of the exclusive end.
        let end_inclusive = range.end_epoch() - 1;
        self.get(&self.endpoint_url(kind)).query(&[
            ("page", page.to_string()),
            ("limit", self.page_limit.to_string()),
            ("starttmp", range.start_epoch().to_string()),
            ("endtmp", end_inclusive.to_string()),
        ])
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let req = self.client.get(url).header(ACCEPT, "application/json");
        match self.auth {
            AuthMode::Bearer => req.bearer_auth(&self.api_key),
            AuthMode::ApiKeyHeader => req.header(API_KEY_HEADER, &self.api_key),
        }
    }

    /// GET one JSON object; `None` on 404.
    fn fetch_object(&self, url: &str, label: &str) -> Result<Option<RawDocument>, AppError> {
        let resp = self.get(url).send().map_err(|e| {
            if e.is_timeout() {
                AppError::upstream(format!("{label}: request timed out"))
            } else {
                AppError::upstream(format!("{label}: request failed: {e}"))
            }
        })?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == StatusCode::UNAUTHORIZED {
            let body = resp.text().unwrap_or_default();
            return Err(AppError::upstream(format!("{label}: 401 Unauthorized: {}", body.trim())));
        }
        if !status.is_success() {
            return Err(AppError::upstream(format!("{label}: request failed with status {status}")));
        }

        match resp.json::<Value>() {
            Ok(Value::Object(map)) => Ok(Some(map)),
            Ok(other) => Err(AppError::upstream(format!(
                "{label}: unexpected response type: {}",
                type_name(&other)
            ))),
            Err(e) => Err(AppError::upstream(format!("{label}: failed to parse response: {e}"))),
        }
    }
}

impl DocumentLookup for HoldedClient {
    fn sales_order(&self, id: &str) -> Result<RawDocument, AppError> {
        let label = format!("pedido {id}");
        let url = format!("{}/{id}", self.endpoint_url(DocumentKind::Order));
        if let Some(doc) = self.fetch_object(&url, &label)? {
            return Ok(doc);
        }
        // Some accounts only serve the detail from the generic documents endpoint.
        debug!(id, "sales order endpoint returned 404; trying the generic documents endpoint");
        let fallback = format!("{}/{id}", self.base_url);
        self.fetch_object(&fallback, &label)?
            .ok_or_else(|| AppError::upstream(format!("{label}: 404 Not Found")))
    }

    fn product(&self, id: &str) -> Result<RawDocument, AppError> {
        let label = format!("producto {id}");
        let url = format!("{}/{id}", self.products_url);
        self.fetch_object(&url, &label)?
            .ok_or_else(|| AppError::upstream(format!("{label}: 404 Not Found")))
    }
}

impl PageSource for HoldedClient {
    fn page_limit(&self) -> usize {
        self.page_limit
    }

    fn fetch_page(&self, kind: DocumentKind, range: &InstantRange, page: u32) -> Result<Page, AppError> {
        let noun = kind.noun();
        let resp = self.request(kind, range, page).send().map_err(|e| {
            if e.is_timeout() {
                AppError::upstream(format!("{noun}: request timed out (page {page})"))
            } else {
                AppError::upstream(format!("{noun}: request failed: {e}"))
            }
        })?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            let body = resp.text().unwrap_or_default();
            return Err(AppError::upstream(format!("{noun}: 401 Unauthorized: {}", body.trim())));
        }
        if !status.is_success() {
            return Err(AppError::upstream(format!(
                "{noun}: request failed with status {status} (page {page})"
            )));
        }

        let body: Value = resp
            .json()
            .map_err(|e| AppError::upstream(format!("{noun}: failed to parse response: {e}")))?;
        parse_page(body).map_err(|msg| AppError::upstream(format!("{noun}: {msg}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use chrono::NaiveDate;
    use chrono_tz::Europe::Madrid;
    use serde_json::json;

    use crate::domain::TimeWindow;
    use crate::error::ErrorKind;

    fn window() -> TimeWindow {
        TimeWindow::for_date(NaiveDate::from_ymd_opt(2025, 9, 14).unwrap(), Madrid)
    }

    fn range() -> InstantRange {
        window().range()
    }

    fn docs(range: std::ops::Range<usize>) -> Vec<RawDocument> {
        range
            .map(|i| json!({ "id": format!("doc-{i}") }).as_object().cloned().unwrap())
            .collect()
    }

    /// Serves canned pages and records which page numbers were requested.
    struct Pages {
        limit: usize,
        pages: Vec<Page>,
        requested: RefCell<Vec<u32>>,
    }

    impl Pages {
        fn new(limit: usize, pages: Vec<Page>) -> Self {
            Self {
                limit,
                pages,
                requested: RefCell::new(Vec::new()),
            }
        }
    }

    impl PageSource for Pages {
        fn page_limit(&self) -> usize {
            self.limit
        }

        fn fetch_page(&self, _kind: DocumentKind, _range: &InstantRange, page: u32) -> Result<Page, AppError> {
            self.requested.borrow_mut().push(page);
            Ok(self.pages.get(page as usize - 1).cloned().unwrap_or_default())
        }
    }

    #[test]
    fn follows_short_last_page() {
        let source = Pages::new(
            50,
            vec![
                Page::from_documents(docs(0..50)),
                Page::from_documents(docs(50..100)),
                Page::from_documents(docs(100..112)),
            ],
        );
        let out = fetch_documents(&source, DocumentKind::Order, &range()).unwrap();
        assert_eq!(out.len(), 112);
        let ids: HashSet<_> = out.iter().map(|d| d["id"].as_str().unwrap().to_string()).collect();
        assert_eq!(ids.len(), 112);
        assert_eq!(out[0]["id"], "doc-0");
        assert_eq!(out[111]["id"], "doc-111");
        assert_eq!(*source.requested.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn stops_on_empty_page() {
        let source = Pages::new(
            2,
            vec![Page::from_documents(docs(0..2)), Page::from_documents(docs(2..4))],
        );
        let out = fetch_documents(&source, DocumentKind::Invoice, &range()).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(*source.requested.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn honors_pagination_metadata() {
        let full = |range| Page {
            total_pages: Some(2),
            ..Page::from_documents(docs(range))
        };
        let source = Pages::new(3, vec![full(0..3), full(3..6), full(6..9)]);
        let out = fetch_documents(&source, DocumentKind::Order, &range()).unwrap();
        assert_eq!(out.len(), 6);

        let more = |range, has_more| Page {
            has_more: Some(has_more),
            ..Page::from_documents(docs(range))
        };
        let source = Pages::new(2, vec![more(0..2, true), more(2..4, false), more(4..6, true)]);
        let out = fetch_documents(&source, DocumentKind::Order, &range()).unwrap();
        assert_eq!(out.len(), 4);

        let counted = |range| Page {
            total: Some(5),
            ..Page::from_documents(docs(range))
        };
        let source = Pages::new(5, vec![counted(0..3), counted(3..5), counted(5..7)]);
        let out = fetch_documents(&source, DocumentKind::Order, &range()).unwrap();
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn error_on_a_later_page_aborts_the_listing() {
        struct Flaky;
        impl PageSource for Flaky {
            fn page_limit(&self) -> usize {
                1
            }
            fn fetch_page(&self, _: DocumentKind, _: &InstantRange, page: u32) -> Result<Page, AppError> {
                if page == 1 {
                    Ok(Page::from_documents(docs(0..1)))
                } else {
                    Err(AppError::upstream("pedidos: request timed out (page 2)"))
                }
            }
        }
        let err = fetch_documents(&Flaky, DocumentKind::Order, &range()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }

    #[test]
    fn endless_pagination_is_an_upstream_error() {
        struct Endless;
        impl PageSource for Endless {
            fn page_limit(&self) -> usize {
                1
            }
            fn fetch_page(&self, _: DocumentKind, _: &InstantRange, _: u32) -> Result<Page, AppError> {
                Ok(Page::from_documents(docs(0..1)))
            }
        }
        let err = fetch_documents(&Endless, DocumentKind::Order, &range()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert!(err.message().contains("did not terminate"));
    }

    #[test]
    fn parses_bare_array_and_envelopes() {
        let page = parse_page(json!([{ "id": "a" }, 7, { "id": "b" }])).unwrap();
        assert_eq!(page.documents.len(), 2);
        assert_eq!(page.total_pages, None);

        let page = parse_page(json!({
            "data": [{ "id": "a" }],
            "totalPages": "3",
            "total": 41,
            "has_more": true
        }))
        .unwrap();
        assert_eq!(page.documents.len(), 1);
        assert_eq!(page.total_pages, Some(3));
        assert_eq!(page.total, Some(41));
        assert_eq!(page.has_more, Some(true));

        assert!(parse_page(json!({ "status": 0, "info": "bad key" })).is_err());
        assert!(parse_page(json!("nope")).is_err());
    }

    fn client(auth: AuthMode) -> HoldedClient {
        HoldedClient::new(&ApiSettings {
            api_key: "secret".to_string(),
            auth,
            base_url: "https://api.example.test/documents/".to_string(),
            products_url: "https://api.example.test/products".to_string(),
            page_limit: 200,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn request_carries_window_and_paging() {
        let w = window();
        let req = client(AuthMode::ApiKeyHeader)
            .request(DocumentKind::Order, &w.range(), 2)
            .build()
            .unwrap();
        assert_eq!(req.url().path(), "/documents/salesorder");
        let query: Vec<(String, String)> = req.url().query_pairs().into_owned().collect();
        assert!(query.contains(&("page".into(), "2".into())));
        assert!(query.contains(&("limit".into(), "200".into())));
        assert!(query.contains(&("starttmp".into(), w.start_epoch().to_string())));
        assert!(query.contains(&("endtmp".into(), (w.end_epoch() - 1).to_string())));
        assert_eq!(req.headers()["key"], "secret");
        assert!(req.headers().get("authorization").is_none());
    }

    #[test]
    fn bearer_mode_uses_authorization_header() {
        let req = client(AuthMode::Bearer)
            .request(DocumentKind::Invoice, &range(), 1)
            .build()
            .unwrap();
        assert_eq!(req.url().path(), "/documents/invoice");
        assert_eq!(req.headers()["authorization"], "Bearer secret");
        assert!(req.headers().get("key").is_none());
    }

    /// What the local server does with one connection.
    enum Reply {
        Http { status: &'static str, body: &'static str },
        /// Read the request, then say nothing for this long.
        Stall(Duration),
    }

    /// HTTP server on a loopback port answering one connection per reply, in
    /// order. Returns the documents base URL and the request lines it saw.
    fn serve(replies: Vec<Reply>) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for reply in replies {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                let mut reader = BufReader::new(&stream);
                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                let mut header = String::new();
                while reader.read_line(&mut header).unwrap() > 0 && header != "\r\n" {
                    header.clear();
                }
                let _ = tx.send(request_line.trim_end().to_string());
                match reply {
                    Reply::Stall(pause) => thread::sleep(pause),
                    Reply::Http { status, body } => {
                        let response = format!(
                            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                            body.len()
                        );
                        let _ = stream.write_all(response.as_bytes());
                    }
                }
            }
        });
        (format!("http://{addr}/documents"), rx)
    }

    fn local_client(base_url: &str, timeout: Duration) -> HoldedClient {
        let mut client = HoldedClient::new(&ApiSettings {
            api_key: "secret".to_string(),
            auth: AuthMode::ApiKeyHeader,
            base_url: base_url.to_string(),
            products_url: base_url.replace("/documents", "/products"),
            page_limit: 200,
            timeout,
        })
        .unwrap();
        // Loopback must not go through a proxy configured in the environment.
        client.client = Client::builder().no_proxy().timeout(timeout).build().unwrap();
        client
    }

    fn http(status: &'static str, body: &'static str) -> Reply {
        Reply::Http { status, body }
    }

    #[test]
    fn server_error_status_fails_the_page() {
        let (base, requests) = serve(vec![http("500 Internal Server Error", "{}")]);
        let client = local_client(&base, Duration::from_secs(5));

        let err = client.fetch_page(DocumentKind::Order, &range(), 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert_eq!(
            err.message(),
            "pedidos: request failed with status 500 Internal Server Error (page 1)"
        );

        let line = requests.recv().unwrap();
        assert!(line.starts_with("GET /documents/salesorder?page=1&limit=200&starttmp="), "{line}");
    }

    #[test]
    fn unauthorized_reports_the_body() {
        let (base, _requests) = serve(vec![http("401 Unauthorized", "Invalid API key\n")]);
        let client = local_client(&base, Duration::from_secs(5));

        let err = client.fetch_page(DocumentKind::Order, &range(), 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert_eq!(err.message(), "pedidos: 401 Unauthorized: Invalid API key");
    }

    #[test]
    fn stalled_server_times_out() {
        let (base, _requests) = serve(vec![Reply::Stall(Duration::from_secs(3))]);
        let client = local_client(&base, Duration::from_secs(1));

        let err = client.fetch_page(DocumentKind::Order, &range(), 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert_eq!(err.message(), "pedidos: request timed out (page 1)");
    }

    #[test]
    fn invalid_json_is_an_upstream_error() {
        let (base, _requests) = serve(vec![http("200 OK", "<html>maintenance</html>")]);
        let client = local_client(&base, Duration::from_secs(5));

        let err = client.fetch_page(DocumentKind::Invoice, &range(), 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert!(err.message().starts_with("facturas: failed to parse response"), "{}", err.message());
    }

    #[test]
    fn bare_array_over_http_is_a_page() {
        let (base, requests) = serve(vec![http("200 OK", r#"[{"id":"a","total":10}]"#)]);
        let client = local_client(&base, Duration::from_secs(5));

        let page = client.fetch_page(DocumentKind::Invoice, &range(), 3).unwrap();
        assert_eq!(page.documents.len(), 1);
        assert_eq!(page.documents[0]["id"], "a");
        assert!(requests.recv().unwrap().starts_with("GET /documents/invoice?page=3&"));
    }

    #[test]
    fn sales_order_falls_back_to_the_documents_endpoint() {
        let (base, requests) = serve(vec![http("404 Not Found", ""), http("200 OK", r#"{"id":"SO-9"}"#)]);
        let client = local_client(&base, Duration::from_secs(5));

        let doc = client.sales_order("SO-9").unwrap();
        assert_eq!(doc["id"], "SO-9");
        assert_eq!(requests.recv().unwrap(), "GET /documents/salesorder/SO-9 HTTP/1.1");
        assert_eq!(requests.recv().unwrap(), "GET /documents/SO-9 HTTP/1.1");
    }

    #[test]
    fn missing_product_is_an_upstream_error() {
        let (base, requests) = serve(vec![http("404 Not Found", "")]);
        let client = local_client(&base, Duration::from_secs(5));

        let err = client.product("p-1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert_eq!(err.message(), "producto p-1: 404 Not Found");
        assert_eq!(requests.recv().unwrap(), "GET /products/p-1 HTTP/1.1");
    }
}
