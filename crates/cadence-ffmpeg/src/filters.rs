//! Rendering of filter toggles into ffmpeg audio filter expressions.

use cadence_core::{FilterKind, FilterParams};

/// ffmpeg expression for a single filter.
pub fn render_filter(kind: FilterKind, params: &FilterParams) -> String {
    let rate = params.sample_rate;
    match kind {
        FilterKind::BassBoost => format!("bass=g={},dynaudnorm=f=200", params.bass_gain_db),
        FilterKind::EightD => format!("apulsator=hz={}", params.eight_d_hz),
        FilterKind::Vaporwave => {
            format!("aresample={rate},asetrate={rate}*{}", params.vaporwave_rate)
        }
        FilterKind::Nightcore => {
            format!("aresample={rate},asetrate={rate}*{}", params.nightcore_rate)
        }
        FilterKind::Phaser => "aphaser=in_gain=0.4".to_string(),
        FilterKind::Tremolo => "tremolo".to_string(),
        FilterKind::Vibrato => format!("vibrato=f={}", params.vibrato_hz),
        FilterKind::Reverse => "areverse".to_string(),
        FilterKind::Treble => format!("treble=g={}", params.treble_gain_db),
        FilterKind::Normalizer => "dynaudnorm=f=200".to_string(),
        FilterKind::Surrounding => "surround".to_string(),
        FilterKind::Pulsator => format!("apulsator=hz={}", params.pulsator_hz),
        FilterKind::SubBoost => "asubboost".to_string(),
        FilterKind::Karaoke => "stereotools=mlev=0.03".to_string(),
        FilterKind::Flanger => "flanger".to_string(),
        FilterKind::Gate => "agate".to_string(),
        FilterKind::Haas => "haas".to_string(),
        FilterKind::Mcompand => "mcompand".to_string(),
    }
}

/// Join the expressions for `filters` into one `-af` value.
/// Returns `None` when there is nothing to apply.
pub fn render_chain(filters: &[FilterKind], params: &FilterParams) -> Option<String> {
    if filters.is_empty() {
        return None;
    }
    let chain: Vec<String> = filters
        .iter()
        .map(|kind| render_filter(*kind, params))
        .collect();
    Some(chain.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameterised_filters() {
        let params = FilterParams::default();
        assert_eq!(
            render_filter(FilterKind::BassBoost, &params),
            "bass=g=20,dynaudnorm=f=200"
        );
        assert_eq!(
            render_filter(FilterKind::Nightcore, &params),
            "aresample=48000,asetrate=48000*1.25"
        );
        assert_eq!(render_filter(FilterKind::EightD, &params), "apulsator=hz=0.08");
    }

    #[test]
    fn test_params_follow_configuration() {
        let params = FilterParams {
            sample_rate: 44_100,
            vaporwave_rate: 0.5,
            treble_gain_db: 8.0,
            ..FilterParams::default()
        };
        assert_eq!(
            render_filter(FilterKind::Vaporwave, &params),
            "aresample=44100,asetrate=44100*0.5"
        );
        assert_eq!(render_filter(FilterKind::Treble, &params), "treble=g=8");
    }

    #[test]
    fn test_every_filter_renders() {
        let params = FilterParams::default();
        for kind in FilterKind::ALL {
            assert!(!render_filter(kind, &params).is_empty(), "{kind} rendered empty");
        }
    }

    #[test]
    fn test_chain() {
        let params = FilterParams::default();
        assert_eq!(render_chain(&[], &params), None);
        assert_eq!(
            render_chain(&[FilterKind::Reverse, FilterKind::Karaoke], &params).as_deref(),
            Some("areverse,stereotools=mlev=0.03")
        );
    }
}
