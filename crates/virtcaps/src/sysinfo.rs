//! Domain `<sysinfo>` block: SMBIOS strings exposed to the guest.

use chrono::NaiveDate;
use virtxml_model::{PropertyBinding, Schema};

use crate::ModelError;

/// Settable fields in the order libvirt expects them.
pub const FIELDS: &[&str] = &[
    "type",
    "bios_vendor",
    "bios_version",
    "bios_date",
    "bios_release",
    "system_manufacturer",
    "system_product",
    "system_version",
    "system_serial",
    "system_uuid",
    "system_sku",
    "system_family",
    "baseBoard_manufacturer",
    "baseBoard_product",
    "baseBoard_version",
    "baseBoard_serial",
    "baseBoard_asset",
    "baseBoard_location",
];

const SYSINFO: Schema = Schema {
    tag: "sysinfo",
    properties: &[
        PropertyBinding::text("type", "./@type"),
        PropertyBinding::text("bios_date", "./bios/entry[@name='date']")
            .validated(validate_bios_date),
        PropertyBinding::text("bios_vendor", "./bios/entry[@name='vendor']"),
        PropertyBinding::text("bios_version", "./bios/entry[@name='version']"),
        PropertyBinding::text("bios_release", "./bios/entry[@name='release']"),
        PropertyBinding::text("system_uuid", "./system/entry[@name='uuid']"),
        PropertyBinding::text("system_manufacturer", "./system/entry[@name='manufacturer']"),
        PropertyBinding::text("system_product", "./system/entry[@name='product']"),
        PropertyBinding::text("system_version", "./system/entry[@name='version']"),
        PropertyBinding::text("system_serial", "./system/entry[@name='serial']"),
        PropertyBinding::text("system_sku", "./system/entry[@name='sku']"),
        PropertyBinding::text("system_family", "./system/entry[@name='family']"),
        PropertyBinding::text(
            "baseBoard_manufacturer",
            "./baseBoard/entry[@name='manufacturer']",
        ),
        PropertyBinding::text("baseBoard_product", "./baseBoard/entry[@name='product']"),
        PropertyBinding::text("baseBoard_version", "./baseBoard/entry[@name='version']"),
        PropertyBinding::text("baseBoard_serial", "./baseBoard/entry[@name='serial']"),
        PropertyBinding::text("baseBoard_asset", "./baseBoard/entry[@name='asset']"),
        PropertyBinding::text("baseBoard_location", "./baseBoard/entry[@name='location']"),
    ],
    children: &[],
    order: FIELDS,
};

/// SMBIOS dates are `mm/dd/yyyy` or `mm/dd/yy`.
fn validate_bios_date(value: &str) -> Result<String, String> {
    let four_digit_year = value.rsplit('/').next().is_some_and(|year| year.len() == 4);
    let long = four_digit_year && NaiveDate::parse_from_str(value, "%m/%d/%Y").is_ok();
    if long || NaiveDate::parse_from_str(value, "%m/%d/%y").is_ok() {
        Ok(value.to_string())
    } else {
        Err(format!("SMBios date string '{value}' is invalid."))
    }
}

model_view!(
    /// Builder and reader for a domain's `<sysinfo>` element.
    DomainSysinfo,
    SYSINFO
);

macro_rules! sysinfo_fields {
    ($($field:literal => $get:ident, $set:ident;)*) => {
        impl DomainSysinfo {
            $(
                pub fn $get(&self) -> Result<Option<String>, ModelError> {
                    self.model.get_text($field)
                }

                pub fn $set(&self, value: &str) -> Result<(), ModelError> {
                    self.model.set_text($field, value)
                }
            )*
        }
    };
}

sysinfo_fields! {
    "type" => sysinfo_type, set_type;
    "bios_vendor" => bios_vendor, set_bios_vendor;
    "bios_version" => bios_version, set_bios_version;
    "bios_date" => bios_date, set_bios_date;
    "bios_release" => bios_release, set_bios_release;
    "system_manufacturer" => system_manufacturer, set_system_manufacturer;
    "system_product" => system_product, set_system_product;
    "system_version" => system_version, set_system_version;
    "system_serial" => system_serial, set_system_serial;
    "system_uuid" => system_uuid, set_system_uuid;
    "system_sku" => system_sku, set_system_sku;
    "system_family" => system_family, set_system_family;
    "baseBoard_manufacturer" => baseboard_manufacturer, set_baseboard_manufacturer;
    "baseBoard_product" => baseboard_product, set_baseboard_product;
    "baseBoard_version" => baseboard_version, set_baseboard_version;
    "baseBoard_serial" => baseboard_serial, set_baseboard_serial;
    "baseBoard_asset" => baseboard_asset, set_baseboard_asset;
    "baseBoard_location" => baseboard_location, set_baseboard_location;
}

impl DomainSysinfo {
    /// Read a field by its name in [`FIELDS`].
    pub fn get(&self, field: &str) -> Result<Option<String>, ModelError> {
        self.model.get_text(field)
    }

    /// Write a field by its name in [`FIELDS`].
    pub fn set(&self, field: &str, value: &str) -> Result<(), ModelError> {
        self.model.set_text(field, value)
    }

    /// Remove a field from the document.
    pub fn clear(&self, field: &str) -> Result<(), ModelError> {
        self.model.clear(field)
    }

    /// Every field that currently has a value, in declared order.
    pub fn entries(&self) -> Result<Vec<(&'static str, String)>, ModelError> {
        let mut out = Vec::new();
        for field in FIELDS {
            if let Some(value) = self.get(field)? {
                out.push((*field, value));
            }
        }
        Ok(out)
    }
}
