//! Demonstrates a reqwest-backed service recovering from an expired access token.
//!
//! The mock backend rejects the stale token with 401. The service refreshes once, stores the new
//! pair, and replays the parked call transparently.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde::Deserialize;
// self
use netservice::{
	auth::Token,
	config::ServiceConfig,
	service::{Endpoint, ReqwestNetworkService},
	store::{MemoryStorage, REFRESH_TOKEN_KEY, TokenStorage},
};

#[derive(Debug, Deserialize)]
struct Post {
	id: u64,
	title: String,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let stale = server
		.mock_async(|when, then| {
			when.method(GET).path("/posts").header("authorization", "Bearer stale-access");
			then.status(401);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh").header("authorization", "demo-refresh");
			then.status(200).header("content-type", "application/json").body(
				r#"{"status":{"code":"200"},"body":{"token_type":"Bearer","expires_in":900,"access_token":"fresh-access","refresh_token":"rotated-refresh"}}"#,
			);
		})
		.await;
	let posts = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/posts")
				.query_param("page", "1")
				.header("authorization", "Bearer fresh-access");
			then.status(200).header("content-type", "application/json").body(
				r#"{"status":{"code":"200","message":"OK"},"body":[{"id":1,"title":"hello"},{"id":2,"title":"world"}]}"#,
			);
		})
		.await;
	let storage = Arc::new(MemoryStorage::default());
	let backend: Arc<dyn TokenStorage> = storage.clone();
	let service = ReqwestNetworkService::new(ServiceConfig::new(server.base_url()), backend)?;

	service.tokens().set(Token::new("stale-access", "demo-refresh")).await?;
	service.add_header("x-client", "fetch-posts-demo");

	let mut params = serde_json::Map::new();

	params.insert("page".into(), 1.into());

	let envelope = service
		.execute(&Endpoint::<Vec<Post>>::get("/posts"), Some(params))
		.await
		.map_err(|e| color_eyre::eyre::eyre!("{}: {}", e.code(), e.message()))?;

	for post in envelope.data.unwrap_or_default() {
		println!("post #{}: {}", post.id, post.title);
	}

	println!("stored refresh token: {:?}", storage.get(REFRESH_TOKEN_KEY));
	println!("refresh metrics: {:?}", service.refresh_metrics());

	stale.assert_async().await;
	refresh.assert_async().await;
	posts.assert_async().await;

	Ok(())
}
