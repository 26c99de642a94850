//! Deterministic listings for tests
//!
//! Every call with the same `n` returns the same rows. Rent is a noisy linear
//! function of the model inputs so a fitted forest scores a positive R².

use crate::models::RawRecord;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const STREETS: [&str; 5] = ["Keizersgracht", "Prinsengracht", "Herengracht", "Damrak", "Rokin"];
const NEIGHBORHOODS: [&str; 4] = ["Centrum", "Zuid", "Oost", "West"];
const ENERGY: [&str; 5] = ["A", "B", "C", "D", "E"];

fn yes_no(flag: bool) -> String {
    if flag { "yes" } else { "no" }.to_string()
}

/// `n` raw listings with both levels of every amenity present once `n >= 12`
pub fn listings(n: usize) -> Vec<RawRecord> {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    (0..n)
        .map(|i| {
            let area = f64::from(rng.gen_range(30u32..150)) + if i % 2 == 0 { 0.5 } else { 0.0 };
            let construction_year = rng.gen_range(1950i64..2022);
            let bedrooms = rng.gen_range(1i64..5);
            let garden_size = if i % 3 == 0 { 0 } else { rng.gen_range(5i64..60) };

            let balcony = i % 2 == 0;
            let storage = (i / 2) % 2 == 0;
            let parking = i % 3 == 1;
            let furnished = (i * 7) % 5 < 2;
            let garage = i % 4 == 1;

            let noise: f64 = rng.gen_range(-80.0..80.0);
            let rent = (400.0
                + 11.0 * area
                + 3.0 * (construction_year - 1950) as f64
                + 90.0 * bedrooms as f64
                + 2.0 * garden_size as f64
                + if balcony { 60.0 } else { 0.0 }
                + if storage { 25.0 } else { 0.0 }
                + if parking { 70.0 } else { 0.0 }
                + if furnished { 150.0 } else { 0.0 }
                + if garage { 110.0 } else { 0.0 }
                + noise)
                .round();

            RawRecord {
                address: format!("{} {}", STREETS[i % STREETS.len()], i + 1),
                area,
                construction_year,
                rooms: bedrooms + 1,
                bedrooms,
                bathrooms: 1 + (bedrooms / 3),
                balcony: yes_no(balcony),
                storage: yes_no(storage),
                parking: yes_no(parking),
                furnished: yes_no(furnished),
                garage: yes_no(garage),
                garden: if garden_size == 0 {
                    "Not present".to_string()
                } else {
                    format!("Present ({} m2)", garden_size)
                },
                energy: ENERGY[i % ENERGY.len()].to_string(),
                facilities: "Elevator; Bike storage".to_string(),
                zip: format!("10{:02}AB", i % 100),
                neighborhood: NEIGHBORHOODS[i % NEIGHBORHOODS.len()].to_string(),
                rent,
            }
        })
        .collect()
}

/// The same rows as `listings(n)` rendered as a headered CSV document
pub fn listings_csv(n: usize) -> String {
    let mut out = String::from(
        "address,area,construction_year,rooms,bedrooms,bathrooms,balcony,storage,parking,\
         furnished,garage,garden,energy,facilities,zip,neighborhood,rent\n",
    );
    for r in listings(n) {
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}\n",
            r.address,
            r.area,
            r.construction_year,
            r.rooms,
            r.bedrooms,
            r.bathrooms,
            r.balcony,
            r.storage,
            r.parking,
            r.furnished,
            r.garage,
            r.garden,
            r.energy,
            r.facilities,
            r.zip,
            r.neighborhood,
            r.rent
        ));
    }
    out
}
