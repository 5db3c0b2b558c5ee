use crate::caps::{Padding, ScaleCaps, VideoCaps};
use crate::config::X264Settings;

pub const SOURCE: &str = "source";
pub const PAD: &str = "pad";
pub const SCALE: &str = "scale";
pub const SINK: &str = "sink";
pub const ALPHA_SINK: &str = "alphasink";

// Replaces RGB with the source alpha so the alpha plane encodes as luma.
const ALPHA_FRAGMENT_SHADER: &str = r#"
#version 120
#ifdef GL_ES
precision mediump float;
#endif
varying vec2 v_texcoord;
uniform sampler2D tex;
uniform float time;
uniform float width;
uniform float height;

void main () {
  vec4 pix = texture2D(tex, v_texcoord);
  gl_FragColor = vec4(pix.a,pix.a,pix.a,0);
}
"#;

const PASSTHROUGH_VERTEX_SHADER: &str = r#"
#version 120
#ifdef GL_ES
precision mediump float;
#endif
attribute vec4 a_position;
attribute vec2 a_texcoord;
varying vec2 v_texcoord;

void main() {
  gl_Position = a_position;
  v_texcoord = a_texcoord;
}
"#;

/// Typed description of the pipelines the encoders run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphDescription {
    /// source → pad to 16x16 → convert/scale → PNG → sink
    Png { source: VideoCaps, padding: Padding },
    /// source → even-size scale → tee into an opaque H.264 branch (sink)
    /// and an alpha-as-luma H.264 branch (alphasink)
    H264Alpha {
        source: VideoCaps,
        scaled: ScaleCaps,
        x264: X264Settings,
    },
}

impl GraphDescription {
    pub fn source(&self) -> &VideoCaps {
        match self {
            Self::Png { source, .. } | Self::H264Alpha { source, .. } => source,
        }
    }

    pub fn sinks(&self) -> &'static [&'static str] {
        match self {
            Self::Png { .. } => &[SINK],
            Self::H264Alpha { .. } => &[SINK, ALPHA_SINK],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Png { .. } => "png",
            Self::H264Alpha { .. } => "h264-alpha",
        }
    }

    /// Renders the launch line understood by `gst-launch` style parsers.
    pub fn to_launch(&self) -> String {
        match self {
            Self::Png { source, padding } => format!(
                "appsrc name={SOURCE} format=time caps={source} ! \
                 videobox name={PAD} border-alpha=0.0 bottom={} right={} ! \
                 videoconvert ! videoscale ! \
                 pngenc ! \
                 appsink max-buffers=1 name={SINK}",
                padding.box_bottom(),
                padding.box_right(),
            ),
            Self::H264Alpha {
                source,
                scaled,
                x264,
            } => {
                let encode = x264_branch(x264, source.framerate);
                format!(
                    "appsrc name={SOURCE} format=time caps={source} ! \
                     videoscale ! capsfilter name={SCALE} caps={scaled} ! \
                     tee name=t ! queue ! \
                     glupload ! glcolorconvert ! \
                     glshader fragment=\"{ALPHA_FRAGMENT_SHADER}\" vertex=\"{PASSTHROUGH_VERTEX_SHADER}\" ! \
                     glcolorconvert ! video/x-raw(memory:GLMemory),format=I420 ! \
                     gldownload ! {encode} ! appsink name={ALPHA_SINK} \
                     t. ! queue ! \
                     videoconvert ! video/x-raw,format=I420 ! \
                     {encode} ! appsink name={SINK}"
                )
            }
        }
    }
}

fn x264_branch(settings: &X264Settings, framerate: u32) -> String {
    format!(
        "x264enc key-int-max={} byte-stream=true pass=quant qp-max={} tune={} speed-preset={} intra-refresh={} ! \
         video/x-h264,profile=constrained-baseline,stream-format=byte-stream,alignment=au,framerate={}/1",
        settings.key_int_max,
        settings.qp_max,
        settings.tune,
        settings.speed_preset,
        settings.intra_refresh,
        framerate,
    )
}
