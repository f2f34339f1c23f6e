use stellium_core::{
    ChartReport, CelestialBody, CelestialPosition, House, HouseCusp, NatalChart, OrbProfile,
    ZodiacSign,
};

fn main() {
    // Example chart with whole-sign style cusps and a handful of bodies.
    let cusps: Vec<HouseCusp> = House::all()
        .enumerate()
        .map(|(i, house)| {
            let degree = i as f64 * 30.0;
            HouseCusp {
                house,
                sign: ZodiacSign::from_longitude(degree),
                degree,
            }
        })
        .collect();
    let positions = vec![
        CelestialPosition::new(CelestialBody::Sun, 10.0, House::First, false),
        CelestialPosition::new(CelestialBody::Moon, 100.0, House::Fourth, false),
        CelestialPosition::new(CelestialBody::Mercury, 25.0, House::First, false),
        CelestialPosition::new(CelestialBody::Venus, 48.0, House::Second, false),
        CelestialPosition::new(CelestialBody::Mars, 192.0, House::Seventh, true),
        CelestialPosition::new(CelestialBody::Jupiter, 130.0, House::Fifth, false),
        CelestialPosition::new(CelestialBody::Saturn, 301.0, House::Eleventh, true),
    ];

    let chart = match NatalChart::new(positions, cusps) {
        Ok(chart) => chart,
        Err(e) => {
            eprintln!("Error: {:?}", e);
            return;
        }
    };

    match ChartReport::calculate(&chart, &OrbProfile::natal()) {
        Ok(report) => println!("{:#?}", report),
        Err(e) => eprintln!("Error: {:?}", e),
    }
}
