//! Mock archive fixtures shared by the integration tests

use std::time::Duration;

use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use neuromorpho_dl::{Config, RetryConfig};

/// Config pointed at a mock server, with retries disabled so failure
/// tests stay fast. Tests that exercise retry behavior raise
/// `retry.max_attempts` themselves.
pub fn test_config(server_uri: &str) -> Config {
    Config {
        api_base_url: format!("{server_uri}/api"),
        site_base_url: server_uri.to_string(),
        request_timeout: Duration::from_secs(5),
        page_size: 20,
        retry: RetryConfig {
            max_attempts: 0,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            backoff_multiplier: 2.0,
            jitter: false,
        },
        ..Config::default()
    }
}

/// One neuron resource as the select endpoint renders it.
pub fn neuron_json(id: i64, name: &str, attrs: &[(&str, &str)]) -> Value {
    let mut object = json!({
        "neuron_id": id,
        "neuron_name": name,
    });
    if let Some(map) = object.as_object_mut() {
        for (key, value) in attrs {
            map.insert((*key).to_string(), json!(value));
        }
    }
    object
}

/// A select result page wrapping `records`.
pub fn select_response(total: u64, records: &[Value]) -> Value {
    json!({
        "_embedded": { "neuronResources": records },
        "page": {
            "size": records.len(),
            "totalElements": total,
            "number": 0,
        }
    })
}

/// Mounts a healthy `/api/health` endpoint.
pub async fn mount_health(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "UP" })))
        .mount(server)
        .await;
}

/// Mounts the accepted-value list for one field.
pub async fn mount_field_values(server: &MockServer, field: &str, values: &[&str]) {
    Mock::given(method("GET"))
        .and(path(format!("/api/neuron/fields/{field}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "fields": values })))
        .mount(server)
        .await;
}

/// Mounts one select result page.
pub async fn mount_select_page(server: &MockServer, page: u32, body: &Value) {
    Mock::given(method("GET"))
        .and(path("/api/neuron/select"))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mounts the neuron page and morphology file for one neuron.
pub async fn mount_morphology(server: &MockServer, name: &str, swc: &str) {
    let href = format!("dableFiles/test/{name}.CNG.swc");
    Mock::given(method("GET"))
        .and(path("/neuron_info.jsp"))
        .and(query_param("neuron_name", name))
        .respond_with(ResponseTemplate::new(200).set_body_string(neuron_page_html(&href)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/{href}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(swc))
        .mount(server)
        .await;
}

/// Neuron page HTML carrying the standardized morphology anchor, plus
/// the original-format anchor the scraper must ignore.
pub fn neuron_page_html(href: &str) -> String {
    format!(
        "<html><body>\n\
         <a href=dableFiles/original/x/file.swc>Morphology File (Original)</a>\n\
         <a href={href}>Morphology File (Standardized)</a>\n\
         </body></html>"
    )
}

/// Small structurally valid SWC payload.
pub const TEST_SWC: &str = "\
# ORIGINAL_SOURCE Neurolucida\n\
1 1 0.0 0.0 0.0 6.5 -1\n\
2 3 4.0 1.0 0.0 1.2 1\n\
3 3 8.0 2.5 0.0 1.0 2\n";
