//! The telecom database: customers, their lines, and the customer's phone.
//!
//! All data in this module is fictional. The database is the single source
//! of truth both toolkits read and mutate: the agent works on the back-office
//! records (`customers`, `lines`), the user on `device`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ── Records ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: String,
    pub name: String,
    pub line_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    Active,
    Suspended,
}

impl LineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LineStatus::Active => "active",
            LineStatus::Suspended => "suspended",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub line_id: String,
    pub phone_number: String,
    pub status: LineStatus,
    pub plan: String,
    pub data_used_gb: f64,
    pub data_limit_gb: f64,
    pub roaming_enabled: bool,
}

impl Line {
    pub fn has_data_left(&self) -> bool {
        self.data_used_gb < self.data_limit_gb
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimStatus {
    Seated,
    Loose,
}

/// The phone in the customer's hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// The line whose SIM is in the phone.
    pub line_id: String,
    pub airplane_mode: bool,
    pub mobile_data: bool,
    pub sim: SimStatus,
    /// The phone is outside the home network.
    pub abroad: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelecomDb {
    pub customers: BTreeMap<String, Customer>,
    pub lines: BTreeMap<String, Line>,
    pub device: Device,
}

// ── Derived device state ─────────────────────────────────────────────────────

impl TelecomDb {
    pub fn device_line(&self) -> Option<&Line> {
        self.lines.get(&self.device.line_id)
    }

    /// The phone can place calls: radio on, SIM seated, line active, and
    /// roaming enabled when abroad.
    pub fn service_working(&self) -> bool {
        let device = &self.device;
        match self.device_line() {
            Some(line) => {
                !device.airplane_mode
                    && device.sim == SimStatus::Seated
                    && line.status == LineStatus::Active
                    && (!device.abroad || line.roaming_enabled)
            }
            None => false,
        }
    }

    /// Service works, mobile data is switched on and the plan has data left.
    pub fn mobile_data_working(&self) -> bool {
        self.service_working()
            && self.device.mobile_data
            && self.device_line().is_some_and(Line::has_data_left)
    }

    /// What the status bar shows.
    pub fn status_bar(&self) -> serde_json::Value {
        let signal = if self.device.airplane_mode {
            "airplane mode"
        } else if self.service_working() {
            "excellent"
        } else {
            "no service"
        };
        let data = if self.mobile_data_working() {
            "LTE"
        } else {
            "none"
        };
        serde_json::json!({
            "signal": signal,
            "data": data,
            "airplane_mode": self.device.airplane_mode,
            "mobile_data": self.device.mobile_data,
            "sim": self.device.sim,
        })
    }
}

// ── Default world ────────────────────────────────────────────────────────────

/// Two customers. Ada's phone carries line L1, which has used its whole
/// data allowance; Ben's line L2 is suspended.
pub fn default_db() -> TelecomDb {
    let customers = [
        Customer {
            customer_id: "C1".to_string(),
            name: "Ada Park".to_string(),
            line_ids: vec!["L1".to_string()],
        },
        Customer {
            customer_id: "C2".to_string(),
            name: "Ben Okafor".to_string(),
            line_ids: vec!["L2".to_string()],
        },
    ]
    .into_iter()
    .map(|c| (c.customer_id.clone(), c))
    .collect();

    let lines = [
        Line {
            line_id: "L1".to_string(),
            phone_number: "555-0101".to_string(),
            status: LineStatus::Active,
            plan: "basic-10".to_string(),
            data_used_gb: 10.0,
            data_limit_gb: 10.0,
            roaming_enabled: false,
        },
        Line {
            line_id: "L2".to_string(),
            phone_number: "555-0102".to_string(),
            status: LineStatus::Suspended,
            plan: "unlimited".to_string(),
            data_used_gb: 0.0,
            data_limit_gb: 100.0,
            roaming_enabled: true,
        },
    ]
    .into_iter()
    .map(|l| (l.line_id.clone(), l))
    .collect();

    TelecomDb {
        customers,
        lines,
        device: Device {
            line_id: "L1".to_string(),
            airplane_mode: false,
            mobile_data: true,
            sim: SimStatus::Seated,
            abroad: false,
        },
    }
}
