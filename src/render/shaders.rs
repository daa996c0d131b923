pub(crate) const SCENE_SHADER: &str = r#"
struct Globals {
    view_proj: mat4x4<f32>,
    camera_position: vec4<f32>,
    ambient: vec4<f32>,
    light_dir: array<vec4<f32>, 2>,
    light_color: array<vec4<f32>, 2>,
}

struct MaterialUniform {
    // rgb, opacity
    color: vec4<f32>,
    // rgb premultiplied by intensity
    emissive: vec4<f32>,
    // metalness, roughness, env intensity, clearcoat
    surface: vec4<f32>,
    // unlit, reflectivity
    flags: vec4<f32>,
}

struct ObjectConstants {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
}

@group(0) @binding(0)
var<uniform> globals: Globals;

@group(1) @binding(0)
var<uniform> material: MaterialUniform;
@group(1) @binding(1)
var color_map: texture_2d<f32>;
@group(1) @binding(2)
var alpha_map: texture_2d<f32>;
@group(1) @binding(3)
var material_sampler: sampler;

@group(2) @binding(0)
var<uniform> object: ObjectConstants;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world_position = object.model * vec4<f32>(input.position, 1.0);
    out.position = globals.view_proj * world_position;
    out.world_pos = world_position.xyz;

    let world_normal = mat3x3<f32>(
        object.normal[0].xyz,
        object.normal[1].xyz,
        object.normal[2].xyz
    ) * input.normal;

    out.normal = normalize(world_normal);
    out.uv = input.uv;
    return out;
}

fn specular_lobe(n: vec3<f32>, l: vec3<f32>, v: vec3<f32>, roughness: f32) -> f32 {
    let shininess = clamp(2.0 / (roughness * roughness * roughness * roughness) - 2.0, 1.0, 2048.0);
    let h = normalize(l + v);
    return pow(max(dot(n, h), 0.0), shininess) * (shininess + 8.0) / 25.1327;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let texel = textureSample(color_map, material_sampler, input.uv);
    let mask = textureSample(alpha_map, material_sampler, input.uv).g;
    let base = material.color.rgb * texel.rgb;
    let alpha = material.color.a * texel.a * mask;

    if (material.flags.x > 0.5) {
        return vec4<f32>(base, alpha);
    }

    let n = normalize(input.normal);
    let v = normalize(globals.camera_position.xyz - input.world_pos);
    let metalness = clamp(material.surface.x, 0.0, 1.0);
    let roughness = clamp(material.surface.y, 0.04, 1.0);
    let diffuse_color = base * (1.0 - metalness);
    let f0 = mix(vec3<f32>(0.16 * material.flags.y * material.flags.y), base, metalness);

    var lit = globals.ambient.rgb * diffuse_color;
    for (var i = 0u; i < 2u; i = i + 1u) {
        let l = normalize(globals.light_dir[i].xyz);
        let n_dot_l = max(dot(n, l), 0.0);
        let specular = f0 * specular_lobe(n, l, v, roughness)
            + vec3<f32>(0.04 * material.surface.w * specular_lobe(n, l, v, 0.1));
        lit = lit + globals.light_color[i].rgb * n_dot_l * (diffuse_color + specular);
    }

    // Stand-in for image based lighting: a uniform environment the colour of
    // the ambient light, attenuated by roughness.
    let fresnel = f0 + (vec3<f32>(1.0) - f0) * pow(1.0 - max(dot(n, v), 0.0), 5.0);
    lit = lit + globals.ambient.rgb * fresnel * material.surface.z * (1.0 - roughness) * 0.25;

    lit = lit + material.emissive.rgb;
    return vec4<f32>(lit, alpha);
}
"#;

/// Fullscreen-triangle vertex stage shared by the post-processing passes.
const FULLSCREEN: &str = r#"
struct FullscreenOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> FullscreenOutput {
    var out: FullscreenOutput;
    let corner = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    out.position = vec4<f32>(corner * 2.0 - 1.0, 0.0, 1.0);
    out.uv = vec2<f32>(corner.x, 1.0 - corner.y);
    return out;
}
"#;

const BLOOM_BODY: &str = r#"
struct BloomUniform {
    texel_size: vec2<f32>,
    threshold: f32,
    spread: f32,
}

@group(0) @binding(0)
var<uniform> params: BloomUniform;
@group(0) @binding(1)
var source: texture_2d<f32>;
@group(0) @binding(2)
var source_sampler: sampler;

var<private> WEIGHTS: array<f32, 5> = array<f32, 5>(0.227027, 0.1945946, 0.1216216, 0.054054, 0.016216);

@fragment
fn fs_bright(input: FullscreenOutput) -> @location(0) vec4<f32> {
    let color = textureSample(source, source_sampler, input.uv).rgb;
    let luminance = dot(color, vec3<f32>(0.299, 0.587, 0.114));
    let weight = smoothstep(params.threshold, params.threshold + 0.01, luminance);
    return vec4<f32>(color * weight, 1.0);
}

fn blur(uv: vec2<f32>, direction: vec2<f32>) -> vec4<f32> {
    let stride = direction * params.texel_size * params.spread;
    var sum = textureSample(source, source_sampler, uv).rgb * WEIGHTS[0];
    for (var i = 1; i < 5; i = i + 1) {
        let offset = stride * f32(i);
        sum = sum + textureSample(source, source_sampler, uv + offset).rgb * WEIGHTS[i];
        sum = sum + textureSample(source, source_sampler, uv - offset).rgb * WEIGHTS[i];
    }
    return vec4<f32>(sum, 1.0);
}

@fragment
fn fs_blur_h(input: FullscreenOutput) -> @location(0) vec4<f32> {
    return blur(input.uv, vec2<f32>(1.0, 0.0));
}

@fragment
fn fs_blur_v(input: FullscreenOutput) -> @location(0) vec4<f32> {
    return blur(input.uv, vec2<f32>(0.0, 1.0));
}
"#;

const COMPOSITE_BODY: &str = r#"
struct CompositeUniform {
    exposure: f32,
    strength: f32,
    _padding: vec2<f32>,
}

@group(0) @binding(0)
var<uniform> params: CompositeUniform;
@group(0) @binding(1)
var scene_texture: texture_2d<f32>;
@group(0) @binding(2)
var bloom_texture: texture_2d<f32>;
@group(0) @binding(3)
var composite_sampler: sampler;

fn aces(color: vec3<f32>) -> vec3<f32> {
    let a = color * (2.51 * color + 0.03);
    let b = color * (2.43 * color + 0.59) + 0.14;
    return clamp(a / b, vec3<f32>(0.0), vec3<f32>(1.0));
}

@fragment
fn fs_main(input: FullscreenOutput) -> @location(0) vec4<f32> {
    let scene = textureSample(scene_texture, composite_sampler, input.uv).rgb;
    let glow = textureSample(bloom_texture, composite_sampler, input.uv).rgb;
    let hdr = scene + glow * params.strength;
    return vec4<f32>(aces(hdr * params.exposure), 1.0);
}
"#;

pub(crate) fn bloom_shader() -> String {
    format!("{FULLSCREEN}{BLOOM_BODY}")
}

pub(crate) fn composite_shader() -> String {
    format!("{FULLSCREEN}{COMPOSITE_BODY}")
}
