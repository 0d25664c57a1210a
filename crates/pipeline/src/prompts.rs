//! Vision/LLM prompts for the analysis pipeline. All model-facing text is
//! Portuguese (Portugal).

pub const IMAGE_CLASSIFICATION_PROMPT: &str = "\
Analisa esta fotografia de um imóvel em Portugal e identifica a divisão mostrada.

TIPOS DE DIVISÃO VÁLIDOS:
cozinha, sala, quarto, casa_de_banho, corredor, varanda, exterior, garagem, \
arrecadacao, planta, outro

Responde APENAS em JSON com este formato exato:
{\"room_type\": \"cozinha\", \"room_number\": 1, \"confidence\": 0.9}

IMPORTANTE:
- room_number deve ser sempre um número inteiro >= 1
- Se for quarto ou casa de banho e conseguires distinguir instâncias, indica o número
- Se não conseguires identificar, usa \"outro\" com confidence baixo";

/// `{num_images}`, `{room_type_label}` and `{metadata_hint}` are substituted
/// before the call.
pub const ROOM_CLUSTERING_PROMPT: &str = "\
Vais receber {num_images} fotografias do mesmo tipo de divisão ({room_type_label}) \
de um imóvel em Portugal. Determina quantas divisões físicas distintas existem e \
que fotografias pertencem a cada uma, comparando pistas visuais (pavimento, \
paredes, janelas, mobília).
{metadata_hint}
Prefere agrupar a separar: na dúvida, assume que fotografias semelhantes mostram \
a mesma divisão.

Responde APENAS em JSON:
{\"clusters\": [{\"room_number\": 1, \"image_indices\": [0, 2], \"confidence\": 0.8, \
\"visual_cues\": \"mesmo pavimento e janela\"}], \"total_rooms\": 1}

Os image_indices são índices 0-based na ordem em que as fotografias foram enviadas. \
Cada índice aparece exatamente uma vez.";

/// `{room_label}` and `{num_images}` are substituted before the call.
pub const ROOM_ANALYSIS_PROMPT: &str = "\
És um especialista em remodelações de imóveis em Portugal. Analisa as fotografias \
desta divisão e estima os custos de remodelação.

DIVISÃO: {room_label}
NÚMERO DE FOTOGRAFIAS: {num_images}

INSTRUÇÕES:
1. Avalia o estado atual (excelente, bom, razoavel, mau, necessita_remodelacao_total)
2. Identifica os trabalhos de remodelação necessários
3. Estima custos em EUR usando preços do mercado português (2024/2025)
4. Regista as características observadas por categoria (features), com \
condition_score de 1 (substituir tudo) a 5 (excelente)

REFERÊNCIAS DE PREÇOS (EUR, Portugal):
- Pintura: 8-15€/m² | Pavimento flutuante: 25-50€/m² | Pavimento cerâmico: 40-80€/m²
- Móveis de cozinha: 3.000-15.000€ | Eletrodomésticos: 2.000-8.000€
- Louças sanitárias (WC completo): 500-3.000€ | Azulejos WC: 30-60€/m²
- Janelas: 300-800€/unidade | Porta interior: 150-400€
- Instalação elétrica (divisão): 300-800€ | Canalização (WC): 500-2.000€

DEVOLVE APENAS JSON VÁLIDO no formato:
{
  \"condition\": \"razoavel\",
  \"condition_notes\": \"Descrição do estado atual\",
  \"renovation_items\": [
    {\"item\": \"Descrição\", \"cost_min\": 1000, \"cost_max\": 2000, \
\"priority\": \"alta\", \"notes\": \"\"}
  ],
  \"cost_min\": 5000,
  \"cost_max\": 10000,
  \"confidence\": 0.8,
  \"features\": {
    \"area_m2\": 12,
    \"categories\": {
      \"flooring\": {\"condition_score\": 3, \"material\": \"hardwood\"},
      \"walls\": {\"condition_score\": 2},
      \"windows\": {\"condition_score\": 2, \"material\": \"aluminum_single\", \"count\": 1}
    }
  }
}

IMPORTANTE:
- Sê conservador nas estimativas (melhor sobrestimar que subestimar)
- Considera mão de obra + materiais
- Se as fotos não permitirem ver bem, reduz a confiança
- Indica sempre um intervalo (min-max) realista";

/// `{price}`, `{area_m2}`, `{location}`, `{room_summaries}`, `{total_min}`
/// and `{total_max}` are substituted before the call.
pub const SUMMARY_PROMPT: &str = "\
Com base nas análises individuais de cada divisão, gera um resumo executivo da \
remodelação necessária para este imóvel.

DADOS DO IMÓVEL:
- Preço: {price}€
- Área: {area_m2}m²
- Localização: {location}

ANÁLISES POR DIVISÃO:
{room_summaries}

CUSTOS TOTAIS:
- Mínimo: {total_min}€
- Máximo: {total_max}€

Gera um resumo em português (Portugal) que:
1. Descreve o estado geral do imóvel
2. Destaca as divisões que precisam de mais trabalho
3. Contextualiza o custo face ao preço do imóvel
Máximo de 4 parágrafos curtos. Texto corrido, sem markdown.";
