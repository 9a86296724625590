use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::model::GuildId;

/// Constructor del comando `filters`.
///
/// Todos los filtros son opcionales; omitirlos los desactiva en el servidor.
/// Activar cualquiera obliga al servidor a decodificar todo el audio a PCM,
/// con el costo de CPU que eso implica.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    /// 1.0 es 100%; valores mayores pueden saturar
    pub volume: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    equalizer: Option<Vec<EqualizerBand>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    karaoke: Option<Karaoke>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timescale: Option<Timescale>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tremolo: Option<Oscillation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vibrato: Option<Oscillation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rotation: Option<Rotation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    distortion: Option<Distortion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel_mix: Option<ChannelMix>,
    #[serde(skip_serializing_if = "Option::is_none")]
    low_pass: Option<LowPass>,
}

#[derive(Debug, Clone, Serialize)]
struct EqualizerBand {
    band: u32,
    gain: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Karaoke {
    level: f64,
    mono_level: f64,
    filter_band: f64,
    filter_width: f64,
}

#[derive(Debug, Clone, Serialize)]
struct Timescale {
    speed: f64,
    pitch: f64,
    rate: f64,
}

#[derive(Debug, Clone, Serialize)]
struct Oscillation {
    frequency: f64,
    depth: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Rotation {
    rotation_hz: f64,
}

/// Parámetros del filtro de distorsión
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Distortion {
    pub sin_offset: f64,
    pub sin_scale: f64,
    pub cos_offset: f64,
    pub cos_scale: f64,
    pub tan_offset: f64,
    pub tan_scale: f64,
    pub offset: f64,
    pub scale: f64,
}

impl Default for Distortion {
    fn default() -> Self {
        Self {
            sin_offset: 0.0,
            sin_scale: 1.0,
            cos_offset: 0.0,
            cos_scale: 1.0,
            tan_offset: 0.0,
            tan_scale: 1.0,
            offset: 0.0,
            scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChannelMix {
    left_to_left: f64,
    left_to_right: f64,
    right_to_left: f64,
    right_to_right: f64,
}

#[derive(Debug, Clone, Serialize)]
struct LowPass {
    smoothing: f64,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            volume: 1.0,
            equalizer: None,
            karaoke: None,
            timescale: None,
            tremolo: None,
            vibrato: None,
            rotation: None,
            distortion: None,
            channel_mix: None,
            low_pass: None,
        }
    }
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn volume(mut self, volume: f64) -> Self {
        self.volume = volume;
        self
    }

    /// Hay 15 bandas (0-14); la ganancia se ajusta a [-0.25, 1.0], donde
    /// -0.25 silencia la banda por completo y 0.25 la duplica.
    pub fn equalizer(mut self, bands: &[(u32, f64)]) -> Result<Self> {
        let mut list = Vec::with_capacity(bands.len());
        for &(band, gain) in bands {
            if band > 14 {
                return Err(Error::InvalidEqualizerBand(band));
            }
            list.push(EqualizerBand {
                band,
                gain: gain.clamp(-0.25, 1.0),
            });
        }
        self.equalizer = Some(list);
        Ok(self)
    }

    /// Elimina parte de una banda por ecualización, normalmente las voces
    pub fn karaoke(mut self, level: f64, mono_level: f64, filter_band: f64, filter_width: f64) -> Self {
        self.karaoke = Some(Karaoke {
            level,
            mono_level,
            filter_band,
            filter_width,
        });
        self
    }

    /// Cambia velocidad, tono y tasa; todos parten de 1.0
    pub fn timescale(mut self, speed: f64, pitch: f64, rate: f64) -> Self {
        self.timescale = Some(Timescale { speed, pitch, rate });
        self
    }

    /// Oscila el volumen (efecto de "temblor")
    pub fn tremolo(mut self, frequency: f64, depth: f64) -> Self {
        self.tremolo = Some(Oscillation { frequency, depth });
        self
    }

    /// Como el trémolo, pero oscilando el tono
    pub fn vibrato(mut self, frequency: f64, depth: f64) -> Self {
        self.vibrato = Some(Oscillation { frequency, depth });
        self
    }

    /// Rota el sonido entre los canales estéreo (audio panning)
    pub fn rotation(mut self, rotation_hz: f64) -> Self {
        self.rotation = Some(Rotation { rotation_hz });
        self
    }

    pub fn distortion(mut self, distortion: Distortion) -> Self {
        self.distortion = Some(distortion);
        self
    }

    /// Mezcla ambos canales; con 0.5 en todos los factores los dos canales
    /// reciben el mismo audio
    pub fn channel_mix(
        mut self,
        left_to_left: f64,
        left_to_right: f64,
        right_to_left: f64,
        right_to_right: f64,
    ) -> Self {
        self.channel_mix = Some(ChannelMix {
            left_to_left,
            left_to_right,
            right_to_left,
            right_to_right,
        });
        self
    }

    /// Suprime las frecuencias altas
    pub fn low_pass(mut self, smoothing: f64) -> Self {
        self.low_pass = Some(LowPass { smoothing });
        self
    }

    pub(crate) fn to_payload(&self, guild_id: GuildId) -> Value {
        let mut payload = serde_json::to_value(self).unwrap_or_else(|_| json!({}));
        payload["op"] = json!("filters");
        payload["guildId"] = json!(guild_id.to_string());
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn payload_carries_op_and_guild() {
        let payload = Filters::new().volume(0.8).to_payload(GuildId(42));
        assert_eq!(payload["op"], "filters");
        assert_eq!(payload["guildId"], "42");
        assert_eq!(payload["volume"], 0.8);
        assert!(payload.get("equalizer").is_none());
    }

    #[test]
    fn equalizer_clamps_gain_and_validates_bands() {
        let filters = Filters::new()
            .equalizer(&[(0, 2.0), (14, -1.0)])
            .expect("bandas válidas");
        let payload = filters.to_payload(GuildId(1));
        assert_eq!(payload["equalizer"][0]["gain"], 1.0);
        assert_eq!(payload["equalizer"][1]["gain"], -0.25);

        assert!(matches!(
            Filters::new().equalizer(&[(15, 0.5)]),
            Err(Error::InvalidEqualizerBand(15))
        ));
    }

    #[test]
    fn timescale_serializes_camel_case() {
        let payload = Filters::new()
            .timescale(1.2, 1.0, 1.0)
            .channel_mix(0.5, 0.5, 0.5, 0.5)
            .to_payload(GuildId(1));
        assert_eq!(payload["timescale"]["speed"], 1.2);
        assert_eq!(payload["channelMix"]["leftToLeft"], 0.5);
    }
}
