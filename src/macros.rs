/// Logs how long `$block` took at debug level with the `stats` feature enabled.
macro_rules! timed {
    ($name:literal, $block:block) => {{
        #[cfg(feature = "stats")]
        {
            let timer = std::time::Instant::now();
            let value = $block;
            bevy::log::debug!("{} took {:?}", $name, timer.elapsed());
            value
        }

        #[cfg(not(feature = "stats"))]
        {
            $block
        }
    }};
}

pub(crate) use timed;
