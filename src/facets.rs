// API facets
//
// Every facet is a static table mapping public operation names to WuBook remote
// procedures and their positional parameters. A single dispatcher (`Facet`) binds
// arguments against the table and sends the call through the session manager.

use crate::error::WuBookError;
use crate::session::{SessionManager, Token};
use crate::xmlrpc::Value;
use chrono::NaiveDate;
use std::fmt;
use tracing::debug;

// WuBook expects calendar dates as dd/mm/yyyy strings
pub const DATE_FORMAT: &str = "%d/%m/%Y";

pub fn date(day: NaiveDate) -> Value {
    Value::String(day.format(DATE_FORMAT).to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacetKind {
    Auth,
    Availability,
    CancellationPolicies,
    ChannelManager,
    Corporate,
    Extras,
    Prices,
    Reservations,
    Restrictions,
    Rooms,
    Transactions,
}

impl FacetKind {
    pub const ALL: [FacetKind; 11] = [
        FacetKind::Auth,
        FacetKind::Availability,
        FacetKind::CancellationPolicies,
        FacetKind::ChannelManager,
        FacetKind::Corporate,
        FacetKind::Extras,
        FacetKind::Prices,
        FacetKind::Reservations,
        FacetKind::Restrictions,
        FacetKind::Rooms,
        FacetKind::Transactions,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FacetKind::Auth => "auth",
            FacetKind::Availability => "availability",
            FacetKind::CancellationPolicies => "cancellation_policies",
            FacetKind::ChannelManager => "channel_manager",
            FacetKind::Corporate => "corporate_functions",
            FacetKind::Extras => "extras",
            FacetKind::Prices => "prices",
            FacetKind::Reservations => "reservations",
            FacetKind::Restrictions => "restrictions",
            FacetKind::Rooms => "rooms",
            FacetKind::Transactions => "transactions",
        }
    }

    pub fn operations(self) -> &'static [Operation] {
        match self {
            FacetKind::Auth => AUTH,
            FacetKind::Availability => AVAILABILITY,
            FacetKind::CancellationPolicies => CANCELLATION_POLICIES,
            FacetKind::ChannelManager => CHANNEL_MANAGER,
            FacetKind::Corporate => CORPORATE,
            FacetKind::Extras => EXTRAS,
            FacetKind::Prices => PRICES,
            FacetKind::Reservations => RESERVATIONS,
            FacetKind::Restrictions => RESTRICTIONS,
            FacetKind::Rooms => ROOMS,
            FacetKind::Transactions => TRANSACTIONS,
        }
    }

    pub fn operation(self, name: &str) -> Option<&'static Operation> {
        self.operations().iter().find(|op| op.name == name)
    }
}

impl fmt::Display for FacetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Property operations receive the lcode right after the token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Account,
    Property,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamDefault {
    Int(i32),
    Str(&'static str),
    EmptyArray,
}

impl ParamDefault {
    fn to_value(self) -> Value {
        match self {
            ParamDefault::Int(i) => Value::Int(i),
            ParamDefault::Str(s) => Value::from(s),
            ParamDefault::EmptyArray => Value::Array(Vec::new()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Param {
    pub name: &'static str,
    pub default: Option<ParamDefault>,
}

// Param literals, so the tables below stay promotable to 'static
macro_rules! req {
    ($name:literal) => {
        Param {
            name: $name,
            default: None,
        }
    };
}

macro_rules! opt {
    ($name:literal, $default:expr) => {
        Param {
            name: $name,
            default: Some($default),
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Operation {
    pub name: &'static str,
    pub remote: &'static str,
    pub scope: Scope,
    pub params: &'static [Param],
}

impl Operation {
    pub fn required_count(&self) -> usize {
        self.params.iter().filter(|p| p.default.is_none()).count()
    }

    // Positional arguments for the remote call, token excluded.
    pub fn bind(&self, lcode: &str, args: Vec<Value>) -> Result<Vec<Value>, WuBookError> {
        let required = self.required_count();
        if args.len() < required || args.len() > self.params.len() {
            let expected = if required == self.params.len() {
                required.to_string()
            } else {
                format!("{} to {}", required, self.params.len())
            };
            return Err(WuBookError::InvalidArguments {
                operation: self.name.to_string(),
                reason: format!("expected {} arguments, got {}", expected, args.len()),
            });
        }

        let mut bound = Vec::with_capacity(self.params.len() + 1);
        if self.scope == Scope::Property {
            bound.push(Value::from(lcode));
        }

        let supplied = args.len();
        bound.extend(args);
        for param in &self.params[supplied..] {
            // trailing params are all optional here, checked above
            if let Some(default) = param.default {
                bound.push(default.to_value());
            }
        }

        Ok(bound)
    }
}

const fn property(name: &'static str, remote: &'static str, params: &'static [Param]) -> Operation {
    Operation {
        name,
        remote,
        scope: Scope::Property,
        params,
    }
}

const fn account(name: &'static str, remote: &'static str, params: &'static [Param]) -> Operation {
    Operation {
        name,
        remote,
        scope: Scope::Account,
        params,
    }
}

use ParamDefault::{EmptyArray, Int, Str};

pub static AUTH: &[Operation] = &[
    account("release_token", "release_token", &[]),
    account("is_token_valid", "is_token_valid", &[]),
    account("provider_info", "provider_info", &[]),
];

pub static AVAILABILITY: &[Operation] = &[
    property(
        "fetch_rooms_values",
        "fetch_rooms_values",
        &[req!("dfrom"), req!("dto"), opt!("rooms", EmptyArray)],
    ),
    property("update_avail", "update_avail", &[req!("dfrom"), req!("rooms")]),
    property("update_sparse_avail", "update_sparse_avail", &[req!("rooms")]),
];

pub static CANCELLATION_POLICIES: &[Operation] = &[
    property("fetch_policies", "fetch_policies", &[opt!("pid", Int(0))]),
    property(
        "new_policy",
        "new_policy",
        &[req!("name"), req!("acnt"), req!("mtype"), req!("value"), req!("ndays")],
    ),
    property(
        "mod_policy",
        "mod_policy",
        &[
            req!("pid"),
            req!("name"),
            req!("acnt"),
            req!("mtype"),
            req!("value"),
            req!("ndays"),
        ],
    ),
    property("del_policy", "del_policy", &[req!("pid")]),
    property(
        "set_policy_calendar",
        "set_policy_calendar",
        &[req!("dfrom"), req!("dto"), req!("pid")],
    ),
];

pub static CHANNEL_MANAGER: &[Operation] = &[
    property("get_otas", "get_otas", &[]),
    property("new_ota", "new_ota", &[req!("tag"), req!("ctype")]),
    property("tag_ota", "tag_ota", &[req!("chid"), req!("tag")]),
];

pub static CORPORATE: &[Operation] = &[
    account(
        "fetch_accounts",
        "corporate_fetch_accounts",
        &[opt!("acode", Str(""))],
    ),
    account(
        "get_providers_info",
        "corporate_get_providers_info",
        &[opt!("acodes", EmptyArray)],
    ),
    account(
        "fetchable_properties",
        "corporate_fetchable_properties",
        &[req!("acode")],
    ),
    account(
        "new_property",
        "corporate_new_property",
        &[req!("lodg"), req!("woodoo"), req!("acode")],
    ),
];

pub static EXTRAS: &[Operation] = &[
    property("fetch_opportunities", "fetch_opportunities", &[]),
    property(
        "new_opportunity",
        "new_opportunity",
        &[req!("name"), req!("dfrom"), req!("dto"), req!("price")],
    ),
    property(
        "mod_opportunity",
        "mod_opportunity",
        &[req!("oid"), req!("name"), req!("dfrom"), req!("dto"), req!("price")],
    ),
    property("del_opportunity", "del_opportunity", &[req!("oid")]),
];

pub static PRICES: &[Operation] = &[
    property("fetch_pricing_plans", "get_pricing_plans", &[]),
    property(
        "add_pricing_plan",
        "add_pricing_plan",
        &[req!("name"), opt!("daily", Int(1))],
    ),
    property(
        "add_virtual_plan",
        "add_vplan",
        &[req!("name"), req!("pid"), req!("dtype"), req!("value")],
    ),
    property("mod_virtual_plans", "mod_vplans", &[req!("plans")]),
    property("delete_plan", "del_plan", &[req!("pid")]),
    property("update_plan_name", "update_plan_name", &[req!("pid"), req!("name")]),
    property(
        "update_plan_prices",
        "update_plan_prices",
        &[req!("pid"), req!("dfrom"), req!("prices")],
    ),
    property(
        "fetch_plan_prices",
        "fetch_plan_prices",
        &[req!("pid"), req!("dfrom"), req!("dto"), opt!("rooms", EmptyArray)],
    ),
    property(
        "convert_to_daily_plan",
        "convert_to_daily_plan",
        &[req!("pid")],
    ),
];

pub static RESERVATIONS: &[Operation] = &[
    property(
        "fetch_reservations",
        "fetch_bookings",
        &[
            opt!("dfrom", Str("")),
            opt!("dto", Str("")),
            opt!("oncreated", Int(1)),
            opt!("ancillary", Int(0)),
        ],
    ),
    property(
        "fetch_new_bookings",
        "fetch_new_bookings",
        &[opt!("ancillary", Int(0)), opt!("mark", Int(1))],
    ),
    property("mark_bookings", "mark_bookings", &[req!("reservations")]),
    property(
        "fetch_booking",
        "fetch_booking",
        &[req!("rcode"), opt!("ancillary", Int(0))],
    ),
    property(
        "fetch_bookings_codes",
        "fetch_bookings_codes",
        &[req!("dfrom"), req!("dto"), opt!("oncreated", Int(1))],
    ),
    property(
        "new_reservation",
        "new_reservation",
        &[
            req!("dfrom"),
            req!("dto"),
            req!("rooms"),
            req!("customer"),
            req!("amount"),
            opt!("origin", Str("")),
            opt!("ccard", Int(0)),
            opt!("ancillary", Int(0)),
            opt!("guests", Int(0)),
            opt!("ignore_restrs", Int(0)),
            opt!("ignore_avail", Int(0)),
            opt!("status", Int(1)),
        ],
    ),
    property(
        "cancel_reservation",
        "cancel_reservation",
        &[req!("rcode"), opt!("reason", Str("")), opt!("send_voucher", Int(0))],
    ),
    property(
        "confirm_reservation",
        "confirm_reservation",
        &[req!("rcode"), opt!("reason", Str(""))],
    ),
    property(
        "reject_reservation",
        "reject_reservation",
        &[req!("rcode"), opt!("reason", Str(""))],
    ),
];

pub static RESTRICTIONS: &[Operation] = &[
    property("fetch_rplans", "rplan_rplans", &[]),
    property(
        "add_rplan",
        "rplan_add_rplan",
        &[req!("name"), opt!("compact", Int(0))],
    ),
    property("rename_rplan", "rplan_rename_rplan", &[req!("pid"), req!("name")]),
    property("delete_rplan", "rplan_del_rplan", &[req!("pid")]),
    property(
        "update_rplan_rules",
        "rplan_update_rplan_rules",
        &[req!("pid"), req!("rules")],
    ),
    property(
        "update_rplan_values",
        "rplan_update_rplan_values",
        &[req!("pid"), req!("dfrom"), req!("values")],
    ),
    property(
        "get_rplan_values",
        "rplan_get_rplan_values",
        &[req!("dfrom"), req!("dto"), opt!("rpids", EmptyArray)],
    ),
];

pub static ROOMS: &[Operation] = &[
    property("fetch_rooms", "fetch_rooms", &[opt!("ancillary", Int(0))]),
    property(
        "fetch_single_room",
        "fetch_single_room",
        &[req!("rid"), opt!("ancillary", Int(0))],
    ),
    property(
        "new_room",
        "new_room",
        &[
            req!("woodoo"),
            req!("name"),
            req!("beds"),
            req!("defprice"),
            req!("avail"),
            req!("shortname"),
            req!("defboard"),
            opt!("names", Str("")),
            opt!("descriptions", Str("")),
            opt!("boards", Str("")),
            opt!("rtype", Int(1)),
            opt!("min_price", Int(0)),
            opt!("max_price", Int(0)),
        ],
    ),
    property(
        "mod_room",
        "mod_room",
        &[
            req!("rid"),
            req!("name"),
            req!("beds"),
            req!("defprice"),
            req!("avail"),
            req!("shortname"),
            req!("defboard"),
            opt!("names", Str("")),
            opt!("descriptions", Str("")),
            opt!("boards", Str("")),
            opt!("min_price", Int(0)),
            opt!("max_price", Int(0)),
        ],
    ),
    property("del_room", "del_room", &[req!("rid")]),
    property("room_images", "room_images", &[req!("rid")]),
    property(
        "push_activation",
        "push_activation",
        &[req!("url"), opt!("test", Int(0))],
    ),
    property("push_url", "push_url", &[]),
];

pub static TRANSACTIONS: &[Operation] = &[
    property("fetch_ccard", "fetch_ccard", &[req!("rcode"), req!("ccpwd")]),
    property(
        "fetch_transactions",
        "fetch_transactions",
        &[req!("dfrom"), req!("dto")],
    ),
];

// Dispatcher for one facet of the API.
pub struct Facet<'a> {
    kind: FacetKind,
    session: &'a SessionManager,
    token: Option<Token>,
}

impl<'a> Facet<'a> {
    pub fn new(kind: FacetKind, session: &'a SessionManager) -> Self {
        Self {
            kind,
            session,
            token: None,
        }
    }

    // Use a caller-provided token instead of the session's own
    pub fn with_token(mut self, token: Token) -> Self {
        self.token = Some(token);
        self
    }

    pub fn kind(&self) -> FacetKind {
        self.kind
    }

    pub fn operations(&self) -> &'static [Operation] {
        self.kind.operations()
    }

    pub async fn call(&self, operation: &str, args: Vec<Value>) -> Result<Value, WuBookError> {
        let op = self
            .kind
            .operation(operation)
            .ok_or_else(|| WuBookError::UnknownOperation {
                facet: self.kind.name().to_string(),
                operation: operation.to_string(),
            })?;

        let bound = op.bind(self.session.credentials().lcode(), args)?;
        debug!(facet = %self.kind, operation, remote = op.remote, "facet call");

        match &self.token {
            Some(token) => self.session.call_with_token(token, op.remote, bound).await,
            None => self.session.call(op.remote, bound).await,
        }
    }
}
