//! Scripted request replay for debugging.
//!
//! A script seeds an in-memory catalog, coupon set and token directory,
//! then sends each step through the same boundary a transport would use.
//! String values in a request may refer to the most recent cart returned:
//! `$cart` is its id, `$item.N` and `$saved.N` the id of its N-th line.

use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use turbo_api::{CartApi, Envelope, RequestContext};
use turbo_auth::{AuthToken, Credentials, Principal, Role, TokenDirectory};
use turbo_cache::{ExpiryReaper, MemoryKv};
use turbo_cart::{
    CartEngine, CartSweeper, CouponRule, InMemoryCatalog, InMemoryCoupons, MemoryCartStore,
    ProductAvailability,
};
use turbo_commerce::cart::{Cart, CouponCode, ItemKey};
use turbo_commerce::ids::{ProductId, UserId, VariantId};
use turbo_ratelimit::FixedWindowLimiter;

use super::ReplayArgs;
use crate::config::ServiceConfig;
use crate::context::Context;
use crate::output::status_badge;

/// A replay script.
#[derive(Debug, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub fixture: Fixture,
    pub steps: Vec<Step>,
}

/// State the in-memory collaborators start with.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub products: Vec<ProductFixture>,
    pub coupons: Vec<CouponFixture>,
    pub users: Vec<UserFixture>,
}

#[derive(Debug, Deserialize)]
pub struct ProductFixture {
    pub product_id: ProductId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    #[serde(flatten)]
    pub availability: ProductAvailability,
}

#[derive(Debug, Deserialize)]
pub struct CouponFixture {
    pub code: CouponCode,
    #[serde(flatten)]
    pub rule: CouponRule,
}

/// A signed-in user reachable through a fixed bearer token.
#[derive(Debug, Deserialize)]
pub struct UserFixture {
    pub token: String,
    pub user_id: UserId,
    #[serde(default)]
    pub roles: Vec<Role>,
}

/// One request in a script.
#[derive(Debug, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub credentials: Credentials,
    /// Request body, sent as JSON so malformed requests replay too.
    pub request: Value,
}

/// What came back for one step.
#[derive(Debug, Serialize)]
pub struct StepResult {
    pub step: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub op: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Envelope,
}

impl StepResult {
    fn succeeded(&self) -> bool {
        self.body.success
    }
}

/// Run the replay command.
pub async fn run(args: ReplayArgs, ctx: &Context) -> Result<()> {
    let path = ctx.resolve_path(&args.script);
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read script: {}", path.display()))?;
    let script: Script = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse script: {}", path.display()))?;

    let session = Session::build(&ctx.config, &script.fixture).await?;
    ctx.output.debug(&format!(
        "seeded {} products, {} coupons, {} users",
        script.fixture.products.len(),
        script.fixture.coupons.len(),
        script.fixture.users.len()
    ));

    let background = if args.background {
        Some(session.spawn_background())
    } else {
        None
    };

    info!(steps = script.steps.len(), script = %path.display(), "replay started");
    let results = session.replay(&script.steps, args.fail_fast).await;

    if let Some((sweeper, reaper)) = background {
        sweeper.abort();
        reaper.abort();
    }

    let failed = results.iter().filter(|r| !r.succeeded()).count();
    info!(sent = results.len(), failed, "replay finished");
    print_results(&results, script.steps.len(), args.headers, ctx);

    if args.fail_fast {
        if let Some(result) = results.iter().find(|r| !r.succeeded()) {
            let code = result
                .body
                .error
                .as_ref()
                .map(|e| e.code.as_str())
                .unwrap_or("UNKNOWN");
            bail!("step {} ({}) failed with {}", result.step, result.op, code);
        }
    }

    Ok(())
}

fn print_results(results: &[StepResult], total: usize, headers: bool, ctx: &Context) {
    if ctx.output.is_json() {
        ctx.output.json(&results);
        return;
    }

    ctx.output.header("Replay");
    for result in results {
        let status = http::StatusCode::from_u16(result.status)
            .map(status_badge)
            .unwrap_or_else(|_| result.status.to_string());
        ctx.output
            .step(result.step, total, &format!("{} {}", result.op, status));
        if let Some(label) = &result.label {
            ctx.output.kv("label", label);
        }
        if headers {
            for (name, value) in &result.headers {
                ctx.output.kv(name, value);
            }
        }
        if let Ok(body) = serde_json::to_string_pretty(&result.body) {
            ctx.output.block(&body);
        }
    }

    let failed = results.iter().filter(|r| !r.succeeded()).count();
    ctx.output.info("");
    if failed == 0 {
        ctx.output
            .success(&format!("{} of {} steps succeeded", results.len(), total));
    } else {
        ctx.output
            .warn(&format!("{} of {} sent steps failed", failed, results.len()));
    }
}

/// An in-memory service seeded from a fixture.
pub struct Session {
    api: CartApi,
    kv: Arc<MemoryKv>,
}

impl Session {
    pub async fn build(config: &ServiceConfig, fixture: &Fixture) -> Result<Self> {
        config.validate()?;

        let catalog = Arc::new(InMemoryCatalog::new());
        for product in &fixture.products {
            let key = ItemKey::new(product.product_id.clone(), product.variant_id.clone());
            catalog.upsert(key, product.availability.clone()).await;
        }

        let coupons = Arc::new(InMemoryCoupons::new());
        for coupon in &fixture.coupons {
            coupons.insert(coupon.code.clone(), coupon.rule.clone()).await;
        }

        let tokens = Arc::new(TokenDirectory::new());
        for user in &fixture.users {
            let roles = if user.roles.is_empty() {
                vec![Role::Customer]
            } else {
                user.roles.clone()
            };
            let mut token = AuthToken::generate(Principal {
                user_id: user.user_id.clone(),
                roles,
            });
            token.token = user.token.clone();
            tokens.insert(token).await;
        }

        let engine = CartEngine::new(
            config.cart.clone(),
            Arc::new(MemoryCartStore::new()),
            catalog,
            coupons,
        );
        let kv = Arc::new(MemoryKv::new());
        let limiter = FixedWindowLimiter::new(kv.clone(), config.rate_limit.clone());

        Ok(Self {
            api: CartApi::new(Arc::new(engine), tokens, limiter),
            kv,
        })
    }

    fn spawn_background(&self) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
        let sweeper = CartSweeper::new(self.api.engine().clone()).spawn();
        let reaper = ExpiryReaper::new(self.kv.clone()).spawn();
        (sweeper, reaper)
    }

    /// Send each step in order.
    pub async fn replay(&self, steps: &[Step], fail_fast: bool) -> Vec<StepResult> {
        let mut results = Vec::with_capacity(steps.len());
        let mut last_cart: Option<Cart> = None;

        for (i, step) in steps.iter().enumerate() {
            let mut request = step.request.clone();
            let op = request
                .get("op")
                .and_then(Value::as_str)
                .unwrap_or("?")
                .to_string();

            let result = match substitute(&mut request, last_cart.as_ref()) {
                Ok(()) => {
                    let ctx = RequestContext::new(step.credentials.clone());
                    let response = self.api.handle_json(ctx, &request.to_string()).await;
                    if let Some(cart) = response.body.data.as_ref().and_then(returned_cart) {
                        last_cart = Some(cart);
                    }
                    StepResult {
                        step: i + 1,
                        label: step.label.clone(),
                        op,
                        status: response.status.as_u16(),
                        headers: response.headers,
                        body: response.body,
                    }
                }
                Err(message) => StepResult {
                    step: i + 1,
                    label: step.label.clone(),
                    op,
                    status: http::StatusCode::BAD_REQUEST.as_u16(),
                    headers: Vec::new(),
                    body: Envelope {
                        success: false,
                        data: None,
                        error: Some(turbo_api::ErrorBody {
                            code: "UNRESOLVED_PLACEHOLDER".to_string(),
                            message,
                        }),
                    },
                },
            };

            let stop = fail_fast && !result.succeeded();
            results.push(result);
            if stop {
                break;
            }
        }
        results
    }
}

/// A cart in response data, directly or inside a merge outcome.
fn returned_cart(data: &Value) -> Option<Cart> {
    serde_json::from_value(data.clone())
        .ok()
        .or_else(|| serde_json::from_value(data.get("cart")?.clone()).ok())
}

/// Replace `$cart`, `$item.N` and `$saved.N` strings.
fn substitute(value: &mut Value, cart: Option<&Cart>) -> Result<(), String> {
    match value {
        Value::String(s) if s.starts_with('$') => {
            *s = resolve_placeholder(s, cart)?;
            Ok(())
        }
        Value::Array(values) => values.iter_mut().try_for_each(|v| substitute(v, cart)),
        Value::Object(map) => map.values_mut().try_for_each(|v| substitute(v, cart)),
        _ => Ok(()),
    }
}

fn resolve_placeholder(placeholder: &str, cart: Option<&Cart>) -> Result<String, String> {
    let cart = cart.ok_or_else(|| format!("{placeholder}: no cart has been returned yet"))?;
    let (name, index) = match placeholder.split_once('.') {
        Some((name, index)) => {
            let index: usize = index
                .parse()
                .map_err(|_| format!("{placeholder}: line index must be a number"))?;
            (name, Some(index))
        }
        None => (placeholder, None),
    };

    let lines = match (name, index) {
        ("$cart", None) => return Ok(cart.id.to_string()),
        ("$item", Some(_)) => &cart.items,
        ("$saved", Some(_)) => &cart.saved_for_later,
        _ => return Err(format!("{placeholder}: unknown placeholder")),
    };
    let index = index.unwrap_or_default();
    lines
        .get(index)
        .map(|line| line.id.to_string())
        .ok_or_else(|| format!("{placeholder}: the last cart has no such line"))
}
