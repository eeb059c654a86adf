use anyhow::{Context, Result};
use rodio::{source::SineWave, OutputStream, Sink, Source};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chime {
    Completed,
    Failed,
}

impl Chime {
    fn tones(self) -> &'static [(f32, u64)] {
        match self {
            Chime::Completed => &[(880.0, 90), (1320.0, 140)],
            Chime::Failed => &[(220.0, 260)],
        }
    }
}

pub fn play(chime: Chime) -> Result<()> {
    let (_stream, handle) = OutputStream::try_default().context("open audio output")?;
    let sink = Sink::try_new(&handle).context("create sink")?;
    for &(freq, millis) in chime.tones() {
        let source = SineWave::new(freq)
            .take_duration(Duration::from_millis(millis))
            .amplify(0.2);
        sink.append(source);
    }
    sink.sleep_until_end();
    Ok(())
}
