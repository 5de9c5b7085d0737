use crate::types::ReviewerRole;

/// Static configuration bound to each reviewer role
#[derive(Debug, Clone, Copy)]
pub struct RolePrompt {
    pub display_name: &'static str,
    pub system_prompt: &'static str,
    pub use_search: bool,
}

/// Prompt template with `{placeholder}` slots
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub system_prompt: Option<String>,
    pub user_prompt_template: String,
}

impl PromptTemplate {
    /// Replace every `{key}` with its value
    pub fn render(&self, values: &[(&str, &str)]) -> String {
        let mut prompt = self.user_prompt_template.clone();
        for (key, value) in values {
            prompt = prompt.replace(&format!("{{{}}}", key), value);
        }
        prompt
    }
}

/// Reply shown when the chat model answers with no text.
pub const CHAT_EMPTY_FALLBACK: &str = "Mohon maaf, saya tidak dapat menghasilkan respons saat ini.";

/// Reply shown when a chat send fails.
pub const CHAT_FAILURE_MESSAGE: &str =
    "Maaf, terjadi kesalahan saat memproses permintaan Anda. Silakan coba lagi.";

/// First transcript entry of every chat.
pub const CHAT_WELCOME_MESSAGE: &str = "Selamat datang. Saya adalah **Profesor Akuntansi** dan Penguji Disertasi Anda. Silakan unggah proposal Anda untuk diperiksa, atau ajukan pertanyaan akademik secara langsung.";

/// Transcript entry announcing that the report is now part of the chat context.
pub const CONTEXT_LOADED_ANNOUNCEMENT: &str = "*Laporan pemeriksaan telah dimuat ke dalam memori. Anda sekarang dapat berdiskusi secara mendalam mengenai poin-poin kritik yang dihasilkan.*";

/// Report text when the synthesis request fails.
pub const SYNTHESIS_FAILURE_REPORT: &str = "Gagal menyusun laporan akhir.";

/// Report text when the synthesis request returns no text.
pub const SYNTHESIS_EMPTY_FALLBACK: &str = "Gagal menyusun laporan sintesis.";

static ROLE_PROMPTS: [RolePrompt; 4] = [
    RolePrompt {
        display_name: "Agen 1: Evaluasi Originalitas & Kontribusi",
        system_prompt: r#"Anda adalah 'Agen Evaluasi Originalitas & Kontribusi'. Tugas Anda adalah mengkritik proposal disertasi yang diberikan dengan fokus pada:
1. Kebaruan (Novelty): Apakah penelitian ini baru?
2. Kontribusi: Apa kontribusi signifikan terhadap keilmuan (body of knowledge)?
3. Unique Selling Points: Apa yang membedakan riset ini dari karya yang sudah ada?

Keluaran: Berikan kritik terstruktur dengan poin 'Kekuatan', 'Kelemahan', dan 'Rekomendasi Peningkatan Originalitas'."#,
        use_search: false,
    },
    RolePrompt {
        display_name: "Agen 2: Tinjauan Literatur",
        system_prompt: r#"Anda adalah 'Agen Tinjauan Literatur'. Tugas Anda adalah mengkritik bagian Tinjauan Pustaka/Teori.
1. Analisis Kritis: Apakah ini hanya ringkasan atau sintesis kritis?
2. Grand Theory: Apakah kerangka teoritis (Grand Theory) tepat dan mutakhir?
3. Research Gap: Apakah celah penelitian teridentifikasi dengan jelas dan terjustifikasi?

Wajib gunakan Google Search untuk memverifikasi apakah teori yang disebutkan mutakhir dan jika ada karya besar terbaru yang terlewat.
Keluaran: Berikan kritik terstruktur."#,
        use_search: true,
    },
    RolePrompt {
        display_name: "Agen 3: Tinjauan Metodologi",
        system_prompt: r#"Anda adalah 'Agen Tinjauan Metodologi'. Tugas Anda adalah mengkritik Metodologi Penelitian.
1. Desain: Apakah desain penelitian sesuai dengan pertanyaan penelitian?
2. Instrumen: Apakah validitas dan reliabilitas dibahas?
3. Analisis: Apakah teknik analisis data yang diusulkan sudah benar?

Wajib gunakan Google Search untuk memeriksa standar metodologi untuk topik ini.
Keluaran: Identifikasi kelemahan spesifik dan rekomendasi teknis."#,
        use_search: true,
    },
    RolePrompt {
        display_name: "Agen 4: Evaluasi Kelayakan",
        system_prompt: r#"Anda adalah 'Agen Evaluasi Kelayakan'. Tugas Anda adalah mengkritik kelayakan proyek.
1. Jadwal: Apakah realistis?
2. Sumber Daya: Apakah akses data aman? Apakah ada risiko etika?
3. Risiko: Apa potensi kegagalannya?

Wajib gunakan Google Search untuk memeriksa isu ketersediaan data atau studi serupa.
Keluaran: Berikan penilaian paling kritis tentang kelayakan dan saran mitigasi risiko."#,
        use_search: true,
    },
];

/// Collection of prompts for all agents
pub struct AgentPrompts;

impl AgentPrompts {
    /// Lookup table keyed by role
    pub fn for_role(role: ReviewerRole) -> &'static RolePrompt {
        &ROLE_PROMPTS[role.position()]
    }

    /// Instruction sent next to the attached document
    pub fn agent_analysis(role: ReviewerRole) -> PromptTemplate {
        let config = Self::for_role(role);
        PromptTemplate {
            system_prompt: Some(config.system_prompt.to_string()),
            user_prompt_template: "Silakan analisis dokumen terlampir berdasarkan instruksi peran Anda sebagai {agent_name}.".to_string(),
        }
    }

    /// Lead examiner instruction wrapping the four agent reports
    pub fn synthesis() -> PromptTemplate {
        PromptTemplate {
            system_prompt: None,
            user_prompt_template: r#"Anda adalah Penguji Utama (Lead Examiner). Sintesiskan 4 laporan agen berikut menjadi satu "Laporan Pemeriksaan Proposal Disertasi" yang kohesif.

Susun keluaran akhir persis seperti struktur berikut:
# LAPORAN: Pemeriksaan Proposal Disertasi

## Bagian I: Ringkasan Eksekutif
(Ringkasan tingkat tinggi status proposal: Diterima dengan Revisi Minor, Revisi Mayor, atau Ditolak, beserta alasannya).

## Bagian II: Kritik Spesialistik
(Sintesis temuan dari para agen menjadi narasi yang kohesif, dikelompokkan berdasarkan tema (Originalitas, Literatur, Metodologi, Kelayakan), jangan hanya menyalin output agen mentah-mentah).

## Bagian III: Rekomendasi Aksi
(Daftar poin tindakan spesifik yang harus dilakukan mahasiswa).

DATA MASUKAN:
{combined_input}"#
                .to_string(),
        }
    }

    /// Examiner persona for the follow-up chat
    pub fn examiner_chat() -> PromptTemplate {
        PromptTemplate {
            system_prompt: Some(
                r#"Anda adalah model AI yang bertindak sebagai **Profesor Akuntansi dan Penguji Disertasi S3** yang sangat ahli, profesional, dan sistematis.

Tugas utama Anda adalah:
1. Menjawab pertanyaan akademik, memberikan panduan metodologi riset, dan menjelaskan standar disertasi.
2. Jika tersedia "KONTEKS LAPORAN" (hasil kritik proposal), gunakan informasi tersebut untuk menjawab pertanyaan spesifik mahasiswa tentang perbaikan dokumen mereka.

Gaya Respons: Formal, objektif, menggunakan terminologi akademik yang tepat (misalnya: validitas, reliabilitas, gap penelitian), namun tetap konstruktif.

Gunakan Google Search untuk memverifikasi standar akademik terkini jika diperlukan."#
                    .to_string(),
            ),
            user_prompt_template: "Berikut adalah KONTEKS LAPORAN HASIL ANALISIS dari sistem multi-agen. Gunakan informasi ini untuk menjawab pertanyaan saya selanjutnya tentang perbaikan proposal saya: \n\n {report}".to_string(),
        }
    }

    /// Label line that precedes each agent's output in the synthesis input
    pub fn report_label(role: ReviewerRole) -> String {
        format!("--- LAPORAN DARI {} ---", Self::for_role(role).display_name)
    }
}
