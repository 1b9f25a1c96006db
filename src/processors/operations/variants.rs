//! Built-in operation variants, one per operation kind.

use std::marker::PhantomData;

use serde_json::{json, Value};

use super::{Details, OperationContext, OperationVariant, EXPERIMENTAL_PROTOCOL_VERSION};
use crate::processors::{amount, Result};
use crate::proto::operation::Body;
use crate::proto::{
    AccountMergeOp, Asset, AssetType, BumpSequenceOp, ChangeTrustOp, ClaimClaimableBalanceOp,
    ClawbackOp, CreateAccountOp, CreateClaimableBalanceOp, HelloWorldOp, InvokeHostFunctionOp,
    ManageDataOp, OperationType, PathPaymentStrictReceiveOp, PaymentOp,
};

/// A variant bound to exactly one operation kind and body.
pub(super) trait TypedOperation: Send + Sync + 'static {
    type Body;

    const TYPE: OperationType;

    const MIN_PROTOCOL: u32 = 0;

    fn body(body: &Body) -> Option<&Self::Body>;

    fn details(body: &Self::Body, ctx: &OperationContext<'_>) -> Result<Details>;

    /// Accounts taking part besides the operation source.
    fn participants(_body: &Self::Body, _ctx: &OperationContext<'_>) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn assets(_body: &Self::Body, _ctx: &OperationContext<'_>) -> Result<Vec<Asset>> {
        Ok(Vec::new())
    }
}

pub(super) struct Typed<T>(PhantomData<fn() -> T>);

impl<T> Typed<T> {
    pub(super) fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: TypedOperation> Typed<T> {
    /// Declines other kinds; a matching kind with the wrong body is malformed.
    fn with_body<R>(
        ctx: &OperationContext<'_>,
        f: impl FnOnce(&T::Body, &OperationContext<'_>) -> Result<R>,
    ) -> Option<Result<R>> {
        if ctx.op.op_type != T::TYPE as i32 {
            return None;
        }
        match ctx.op.body.as_ref().and_then(T::body) {
            Some(body) => Some(f(body, ctx)),
            None => Some(Err(ctx.malformed(T::TYPE.name(), "body does not match operation type"))),
        }
    }
}

impl<T: TypedOperation> OperationVariant for Typed<T> {
    fn name(&self) -> &'static str {
        T::TYPE.name()
    }

    fn min_protocol(&self) -> u32 {
        T::MIN_PROTOCOL
    }

    fn details(&self, ctx: &OperationContext<'_>) -> Option<Result<Details>> {
        Self::with_body(ctx, T::details)
    }

    fn participants(&self, ctx: &OperationContext<'_>) -> Option<Result<Vec<String>>> {
        Self::with_body(ctx, T::participants)
    }

    fn assets(&self, ctx: &OperationContext<'_>) -> Option<Result<Vec<Asset>>> {
        Self::with_body(ctx, T::assets)
    }
}

fn object(value: Value) -> Details {
    match value {
        Value::Object(map) => map,
        _ => Details::new(),
    }
}

fn required_asset<'a>(
    asset: &'a Option<Asset>,
    ctx: &OperationContext<'_>,
    kind: &'static str,
) -> Result<&'a Asset> {
    asset
        .as_ref()
        .ok_or_else(|| ctx.malformed(kind, "missing asset"))
}

/// Add `{prefix}asset_type`, and code and issuer for credit assets.
fn add_asset(
    details: &mut Details,
    prefix: &str,
    asset: &Asset,
    ctx: &OperationContext<'_>,
    kind: &'static str,
) -> Result<()> {
    let asset_type = AssetType::try_from(asset.asset_type)
        .map_err(|_| ctx.malformed(kind, format!("unknown asset type {}", asset.asset_type)))?;
    details.insert(format!("{}asset_type", prefix), asset_type.name().into());
    if !asset.is_native() {
        details.insert(format!("{}asset_code", prefix), asset.code.clone().into());
        details.insert(format!("{}asset_issuer", prefix), asset.issuer.clone().into());
    }
    Ok(())
}

pub(super) struct CreateAccount;

impl TypedOperation for CreateAccount {
    type Body = CreateAccountOp;
    const TYPE: OperationType = OperationType::CreateAccount;

    fn body(body: &Body) -> Option<&CreateAccountOp> {
        match body {
            Body::CreateAccount(op) => Some(op),
            _ => None,
        }
    }

    fn details(op: &CreateAccountOp, ctx: &OperationContext<'_>) -> Result<Details> {
        Ok(object(json!({
            "funder": ctx.source(),
            "account": op.destination,
            "starting_balance": amount::format(op.starting_balance),
        })))
    }

    fn participants(op: &CreateAccountOp, _ctx: &OperationContext<'_>) -> Result<Vec<String>> {
        Ok(vec![op.destination.clone()])
    }

    fn assets(_op: &CreateAccountOp, _ctx: &OperationContext<'_>) -> Result<Vec<Asset>> {
        Ok(vec![Asset::native()])
    }
}

pub(super) struct Payment;

impl TypedOperation for Payment {
    type Body = PaymentOp;
    const TYPE: OperationType = OperationType::Payment;

    fn body(body: &Body) -> Option<&PaymentOp> {
        match body {
            Body::Payment(op) => Some(op),
            _ => None,
        }
    }

    fn details(op: &PaymentOp, ctx: &OperationContext<'_>) -> Result<Details> {
        let mut details = object(json!({
            "from": ctx.source(),
            "to": op.destination,
            "amount": amount::format(op.amount),
        }));
        add_asset(&mut details, "", required_asset(&op.asset, ctx, "payment")?, ctx, "payment")?;
        Ok(details)
    }

    fn participants(op: &PaymentOp, _ctx: &OperationContext<'_>) -> Result<Vec<String>> {
        Ok(vec![op.destination.clone()])
    }

    fn assets(op: &PaymentOp, ctx: &OperationContext<'_>) -> Result<Vec<Asset>> {
        Ok(vec![required_asset(&op.asset, ctx, "payment")?.clone()])
    }
}

pub(super) struct PathPaymentStrictReceive;

impl TypedOperation for PathPaymentStrictReceive {
    type Body = PathPaymentStrictReceiveOp;
    const TYPE: OperationType = OperationType::PathPaymentStrictReceive;

    fn body(body: &Body) -> Option<&PathPaymentStrictReceiveOp> {
        match body {
            Body::PathPaymentStrictReceive(op) => Some(op),
            _ => None,
        }
    }

    fn details(op: &PathPaymentStrictReceiveOp, ctx: &OperationContext<'_>) -> Result<Details> {
        let kind = Self::TYPE.name();
        let mut details = object(json!({
            "from": ctx.source(),
            "to": op.destination,
            "amount": amount::format(op.dest_amount),
            "source_max": amount::format(op.send_max),
        }));
        add_asset(&mut details, "", required_asset(&op.dest_asset, ctx, kind)?, ctx, kind)?;
        add_asset(&mut details, "source_", required_asset(&op.send_asset, ctx, kind)?, ctx, kind)?;

        let mut path = Vec::with_capacity(op.path.len());
        for hop in &op.path {
            let mut entry = Details::new();
            add_asset(&mut entry, "", hop, ctx, kind)?;
            path.push(Value::Object(entry));
        }
        details.insert("path".to_string(), Value::Array(path));
        Ok(details)
    }

    fn participants(op: &PathPaymentStrictReceiveOp, _ctx: &OperationContext<'_>) -> Result<Vec<String>> {
        Ok(vec![op.destination.clone()])
    }

    fn assets(op: &PathPaymentStrictReceiveOp, ctx: &OperationContext<'_>) -> Result<Vec<Asset>> {
        let kind = Self::TYPE.name();
        let mut assets = vec![
            required_asset(&op.send_asset, ctx, kind)?.clone(),
            required_asset(&op.dest_asset, ctx, kind)?.clone(),
        ];
        assets.extend(op.path.iter().cloned());
        Ok(assets)
    }
}

pub(super) struct ChangeTrust;

impl TypedOperation for ChangeTrust {
    type Body = ChangeTrustOp;
    const TYPE: OperationType = OperationType::ChangeTrust;

    fn body(body: &Body) -> Option<&ChangeTrustOp> {
        match body {
            Body::ChangeTrust(op) => Some(op),
            _ => None,
        }
    }

    fn details(op: &ChangeTrustOp, ctx: &OperationContext<'_>) -> Result<Details> {
        let line = required_asset(&op.line, ctx, Self::TYPE.name())?;
        if line.is_native() {
            return Err(ctx.malformed(Self::TYPE.name(), "cannot trust the native asset"));
        }
        let mut details = object(json!({
            "trustor": ctx.source(),
            "trustee": line.issuer,
            "limit": amount::format(op.limit),
        }));
        add_asset(&mut details, "", line, ctx, Self::TYPE.name())?;
        Ok(details)
    }

    fn participants(op: &ChangeTrustOp, ctx: &OperationContext<'_>) -> Result<Vec<String>> {
        let line = required_asset(&op.line, ctx, Self::TYPE.name())?;
        Ok(vec![line.issuer.clone()])
    }

    fn assets(op: &ChangeTrustOp, ctx: &OperationContext<'_>) -> Result<Vec<Asset>> {
        Ok(vec![required_asset(&op.line, ctx, Self::TYPE.name())?.clone()])
    }
}

pub(super) struct AccountMerge;

impl TypedOperation for AccountMerge {
    type Body = AccountMergeOp;
    const TYPE: OperationType = OperationType::AccountMerge;

    fn body(body: &Body) -> Option<&AccountMergeOp> {
        match body {
            Body::AccountMerge(op) => Some(op),
            _ => None,
        }
    }

    fn details(op: &AccountMergeOp, ctx: &OperationContext<'_>) -> Result<Details> {
        Ok(object(json!({
            "account": ctx.source(),
            "into": op.destination,
        })))
    }

    fn participants(op: &AccountMergeOp, _ctx: &OperationContext<'_>) -> Result<Vec<String>> {
        Ok(vec![op.destination.clone()])
    }
}

pub(super) struct ManageData;

impl TypedOperation for ManageData {
    type Body = ManageDataOp;
    const TYPE: OperationType = OperationType::ManageData;

    fn body(body: &Body) -> Option<&ManageDataOp> {
        match body {
            Body::ManageData(op) => Some(op),
            _ => None,
        }
    }

    fn details(op: &ManageDataOp, _ctx: &OperationContext<'_>) -> Result<Details> {
        use base64::Engine;

        let value = op
            .data_value
            .as_ref()
            .map(|v| base64::engine::general_purpose::STANDARD.encode(v));
        Ok(object(json!({
            "name": op.data_name,
            "value": value,
        })))
    }
}

pub(super) struct BumpSequence;

impl TypedOperation for BumpSequence {
    type Body = BumpSequenceOp;
    const TYPE: OperationType = OperationType::BumpSequence;

    fn body(body: &Body) -> Option<&BumpSequenceOp> {
        match body {
            Body::BumpSequence(op) => Some(op),
            _ => None,
        }
    }

    fn details(op: &BumpSequenceOp, _ctx: &OperationContext<'_>) -> Result<Details> {
        Ok(object(json!({ "bump_to": op.bump_to.to_string() })))
    }
}

pub(super) struct CreateClaimableBalance;

impl TypedOperation for CreateClaimableBalance {
    type Body = CreateClaimableBalanceOp;
    const TYPE: OperationType = OperationType::CreateClaimableBalance;

    fn body(body: &Body) -> Option<&CreateClaimableBalanceOp> {
        match body {
            Body::CreateClaimableBalance(op) => Some(op),
            _ => None,
        }
    }

    fn details(op: &CreateClaimableBalanceOp, ctx: &OperationContext<'_>) -> Result<Details> {
        let asset = required_asset(&op.asset, ctx, Self::TYPE.name())?;
        Ok(object(json!({
            "asset": asset.canonical(),
            "amount": amount::format(op.amount),
            "claimants": op.claimants,
        })))
    }

    fn participants(op: &CreateClaimableBalanceOp, _ctx: &OperationContext<'_>) -> Result<Vec<String>> {
        Ok(op.claimants.clone())
    }

    fn assets(op: &CreateClaimableBalanceOp, ctx: &OperationContext<'_>) -> Result<Vec<Asset>> {
        Ok(vec![required_asset(&op.asset, ctx, Self::TYPE.name())?.clone()])
    }
}

pub(super) struct ClaimClaimableBalance;

impl TypedOperation for ClaimClaimableBalance {
    type Body = ClaimClaimableBalanceOp;
    const TYPE: OperationType = OperationType::ClaimClaimableBalance;

    fn body(body: &Body) -> Option<&ClaimClaimableBalanceOp> {
        match body {
            Body::ClaimClaimableBalance(op) => Some(op),
            _ => None,
        }
    }

    fn details(op: &ClaimClaimableBalanceOp, ctx: &OperationContext<'_>) -> Result<Details> {
        Ok(object(json!({
            "claimant": ctx.source(),
            "balance_id": hex::encode(&op.balance_id),
        })))
    }
}

pub(super) struct Clawback;

impl TypedOperation for Clawback {
    type Body = ClawbackOp;
    const TYPE: OperationType = OperationType::Clawback;

    fn body(body: &Body) -> Option<&ClawbackOp> {
        match body {
            Body::Clawback(op) => Some(op),
            _ => None,
        }
    }

    fn details(op: &ClawbackOp, ctx: &OperationContext<'_>) -> Result<Details> {
        let mut details = object(json!({
            "from": op.from,
            "amount": amount::format(op.amount),
        }));
        add_asset(
            &mut details,
            "",
            required_asset(&op.asset, ctx, Self::TYPE.name())?,
            ctx,
            Self::TYPE.name(),
        )?;
        Ok(details)
    }

    fn participants(op: &ClawbackOp, _ctx: &OperationContext<'_>) -> Result<Vec<String>> {
        Ok(vec![op.from.clone()])
    }

    fn assets(op: &ClawbackOp, ctx: &OperationContext<'_>) -> Result<Vec<Asset>> {
        Ok(vec![required_asset(&op.asset, ctx, Self::TYPE.name())?.clone()])
    }
}

pub(super) struct InvokeHostFunction;

impl TypedOperation for InvokeHostFunction {
    type Body = InvokeHostFunctionOp;
    const TYPE: OperationType = OperationType::InvokeHostFunction;

    fn body(body: &Body) -> Option<&InvokeHostFunctionOp> {
        match body {
            Body::InvokeHostFunction(op) => Some(op),
            _ => None,
        }
    }

    fn details(op: &InvokeHostFunctionOp, _ctx: &OperationContext<'_>) -> Result<Details> {
        Ok(object(json!({
            "function": "invoke_contract",
            "contract_id": hex::encode(&op.contract_id),
            "function_name": op.function_name,
            "parameter_count": op.args.len(),
        })))
    }

    /// Address arguments are participants too.
    fn participants(op: &InvokeHostFunctionOp, _ctx: &OperationContext<'_>) -> Result<Vec<String>> {
        Ok(op
            .args
            .iter()
            .filter_map(|arg| arg.as_address())
            .filter(|addr| addr.starts_with('G'))
            .map(str::to_string)
            .collect())
    }
}

pub(super) struct HelloWorld;

impl TypedOperation for HelloWorld {
    type Body = HelloWorldOp;
    const TYPE: OperationType = OperationType::HelloWorld;
    const MIN_PROTOCOL: u32 = EXPERIMENTAL_PROTOCOL_VERSION;

    fn body(body: &Body) -> Option<&HelloWorldOp> {
        match body {
            Body::HelloWorld(op) => Some(op),
            _ => None,
        }
    }

    fn details(_op: &HelloWorldOp, _ctx: &OperationContext<'_>) -> Result<Details> {
        Ok(Details::new())
    }
}
