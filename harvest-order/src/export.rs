use harvest_core::{CoreError, CoreResult};
use harvest_shared::PickupView;
use std::io;

pub const EXPORT_HEADER: [&str; 8] = [
    "Pickup ID",
    "Order ID",
    "Customer",
    "Status",
    "Pickup Date",
    "Location",
    "Contact Person",
    "Notes",
];

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Writes the header and one CSV row per pickup. The header is written even
/// when there are no rows.
pub fn write_pickups_csv<W: io::Write>(rows: &[PickupView], out: W) -> CoreResult<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(EXPORT_HEADER).map_err(export_error)?;
    write_rows(&mut writer, rows)?;
    writer.flush().map_err(|e| CoreError::Persistence(format!("export flush failed: {}", e)))
}

pub fn pickups_csv(rows: &[PickupView]) -> CoreResult<Vec<u8>> {
    let mut buffer = Vec::new();
    write_pickups_csv(rows, &mut buffer)?;
    Ok(buffer)
}

/// The header line on its own, for streamed exports.
pub fn header_csv() -> CoreResult<Vec<u8>> {
    pickups_csv(&[])
}

/// Rows without a header, for streamed exports.
pub fn rows_csv(rows: &[PickupView]) -> CoreResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    write_rows(&mut writer, rows)?;
    writer
        .into_inner()
        .map_err(|e| CoreError::Persistence(format!("export flush failed: {}", e)))
}

fn write_rows<W: io::Write>(writer: &mut csv::Writer<W>, rows: &[PickupView]) -> CoreResult<()> {
    for view in rows {
        let pickup = &view.pickup;
        writer
            .write_record([
                pickup.id.to_string(),
                pickup.order_id.to_string(),
                view.customer_name.clone(),
                pickup.status.as_str().to_string(),
                pickup.scheduled_for.format(DATE_FORMAT).to_string(),
                pickup.location.clone(),
                pickup.contact_person.clone().unwrap_or_default(),
                pickup.notes.clone().unwrap_or_default(),
            ])
            .map_err(export_error)?;
    }
    Ok(())
}

fn export_error(err: csv::Error) -> CoreError {
    CoreError::Persistence(format!("export write failed: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use harvest_shared::{NewPickup, Pickup, PickupStatus};
    use uuid::Uuid;

    #[test]
    fn test_header_only_when_empty() {
        let bytes = pickups_csv(&[]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "Pickup ID,Order ID,Customer,Status,Pickup Date,Location,Contact Person,Notes\n"
        );
    }

    #[test]
    fn test_row_layout() {
        let mut pickup = Pickup::new(
            NewPickup {
                order_id: Uuid::new_v4(),
                location: "Gate 3, East Field".into(),
                scheduled_for: Utc.with_ymd_and_hms(2024, 6, 2, 7, 5, 0).unwrap(),
                contact_person: Some("Lin".into()),
                notes: None,
            },
            Utc::now(),
        );
        pickup.status = PickupStatus::InTransit;
        let view = PickupView {
            pickup: pickup.clone(),
            customer_name: "Ada Farmer".into(),
        };

        let text = String::from_utf8(pickups_csv(&[view.clone()]).unwrap()).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert_eq!(
            row,
            format!(
                "{},{},Ada Farmer,in_transit,2024-06-02 07:05,\"Gate 3, East Field\",Lin,",
                pickup.id, pickup.order_id
            )
        );

        let streamed = [header_csv().unwrap(), rows_csv(&[view]).unwrap()].concat();
        assert_eq!(String::from_utf8(streamed).unwrap(), text);
    }
}
